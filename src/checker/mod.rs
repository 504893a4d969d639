//! The four checking layers
//!
//! Every layer reports through an observer trait with named callback
//! slots, one per signal; all methods default to no-ops so consumers
//! implement only what they need. Observers are shared (`Arc<dyn …>`) and
//! invoked from whichever task produced the signal; consumers correlate
//! link results by `html.index`/`offset_index`, not arrival order.
//!
//! Each checker is generic over a custom-data type `D` (default `()`)
//! carried with every enqueued item and handed back, by reference, with
//! each of its signals.

pub mod html;
pub mod page;
pub mod site;
pub mod url;

pub use html::{HtmlCheckObserver, HtmlChecker};
pub use page::{HtmlUrlChecker, HtmlUrlObserver};
pub use site::{SiteChecker, SiteObserver};
pub use url::{UrlCheckObserver, UrlChecker};
