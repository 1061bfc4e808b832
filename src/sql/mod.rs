pub mod generator;
pub mod model;
pub mod render;
pub mod sort;
pub mod source;

pub use generator::{
    is_selected_with_root, SqlGenerator, SqlStatement, ID_PARAMETER, IDS_PARAMETER,
    ROOT_ID_PARAMETER, VERSION_PARAMETER,
};
pub use model::{BindMarker, Condition, Expression, Select, Statement, TableRef};
pub use render::SqlRenderer;
pub use sort::{Direction, Order, Pageable, Sort};
pub use source::SqlGeneratorSource;
