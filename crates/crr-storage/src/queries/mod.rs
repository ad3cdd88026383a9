//! Query modules: free functions over `&Connection`, one module per
//! bookkeeping concern.

pub mod changelog_ops;
pub mod clock_ops;
pub mod watermark_ops;
