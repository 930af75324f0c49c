pub mod footer;
pub mod header;
pub mod utils;

pub use footer::{draw_footer, Notice};
pub use header::{draw_header, HeaderContext};
pub use utils::{
  cells, ensure_valid_selection, local_time, priority_color, source_badge, status_color, truncate,
};
