pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{banner, dim, error, header, info, is_quiet, muted, section, success, warn};
pub use table::{queries_table, stats_table};
pub use theme::{theme, Theme};
