mod campaigns;
mod subscribers;

pub use campaigns::*;
pub use subscribers::*;
