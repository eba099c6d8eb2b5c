//! Affinity masks over processing-unit indices, with conversion to and from
//! the `cpulist` strings Linux tooling uses for processor IDs.
//!
//! A [`PuMask`] is created with the width of the machine (its processing-unit
//! count) and identifies the processing units a worker thread may run on.
//! [`parse()`] reads a cpulist into a mask and [`emit()`] renders one back.
//!
//! # Format
//!
//! A cpulist such as `0-9,32-35,40` is a comma-separated list of zero or
//! more parts, each a single index (`1`), an inclusive index range (`2-4`)
//! or a range with a stride (`5-9:2`, equivalent to `5,7,9`). Whitespace is
//! not allowed anywhere in the string.
//!
//! # Example
//!
//! ```
//! let mask = pu_mask::parse(8, "0-3,7")?;
//!
//! assert_eq!(mask.count(), 5);
//! assert_eq!(pu_mask::emit(&mask), "0-3,7");
//! # Ok::<(), pu_mask::Error>(())
//! ```

mod emit;
mod error;
mod mask;
mod parse;

pub use emit::*;
pub use error::*;
pub use mask::*;
pub use parse::*;
