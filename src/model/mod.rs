pub mod content;
pub mod history;
pub mod knowledge_point;
pub mod path;

pub use content::*;
pub use history::*;
pub use knowledge_point::*;
pub use path::*;
