use owo_colors::Style;
use std::sync::OnceLock;

static THEME: OnceLock<Theme> = OnceLock::new();

/// Styles for CLI output, one per kind of thing shown
#[derive(Debug, Clone)]
pub struct Theme {
    pub heading: Style,
    pub ok: Style,
    pub failure: Style,
    pub caution: Style,
    pub label: Style,
    pub detail: Style,
    /// Footers such as "3 saved queries"
    pub count: Style,
    pub query_name: Style,
    pub tag: Style,
}

impl Theme {
    /// Colors only when stdout is a terminal and `NO_COLOR` is unset
    pub fn detect() -> Self {
        let colored =
            console::Term::stdout().is_term() && std::env::var_os("NO_COLOR").is_none();
        Self::new(colored)
    }

    pub fn new(colored: bool) -> Self {
        let pick = |style: Style| if colored { style } else { Style::new() };
        Self {
            heading: pick(Style::new().cyan().bold()),
            ok: pick(Style::new().green().bold()),
            failure: pick(Style::new().red().bold()),
            caution: pick(Style::new().yellow().bold()),
            label: pick(Style::new().magenta()),
            detail: pick(Style::new().white().dimmed()),
            count: pick(Style::new().bright_black()),
            query_name: pick(Style::new().bold()),
            tag: pick(Style::new().blue()),
        }
    }
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::detect)
}
