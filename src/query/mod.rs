pub mod chain;
pub mod parser;
pub mod reference;
pub mod resolver;
pub mod tree;

pub use chain::{ChainGuard, ResolutionChain};
pub use parser::QueryParser;
pub use reference::SavedQueryReference;
pub use resolver::{CompositeResult, InnerQueryParser, ResolverOptions, SavedQueryResolver};
pub use tree::{BoolQuery, QueryTree, RangeBounds};
