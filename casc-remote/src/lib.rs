//! # casc-remote
//!
//! Remote CASC client. Resolves a file data ID through the chain of
//! indirections the CDN imposes - root table, encoding table, archive
//! index - down to a ranged GET against an archive blob, with a per-build
//! disk cache interposed at every step.
//!
//! The entry point is [`CascRemote`]:
//!
//! ```no_run
//! use casc_remote::{CascRemote, Region};
//! use casc_formats::blte::{BlteBlob, BlteDecoder};
//! use std::sync::Arc;
//!
//! # struct Decoder;
//! # impl BlteDecoder for Decoder {
//! #     fn decode(&self, blob: &BlteBlob) -> casc_formats::Result<Vec<u8>> {
//! #         Ok(blob.data.clone())
//! #     }
//! # }
//! # async fn run() -> casc_remote::Result<()> {
//! let mut casc = CascRemote::new(Region::US, "/var/cache/casc", Arc::new(Decoder))?;
//! casc.init().await?;
//! casc.load(0).await?;
//!
//! let blob = casc.get_file(1322105).await?;
//! println!("{} bytes, encoding key {}", blob.len(), blob.ekey);
//! # Ok(())
//! # }
//! ```

mod cdn;
mod error;
mod ping;
mod pipeline;
mod progress;
mod region;
mod tact;

pub use cdn::CdnClient;
pub use error::{Error, Result};
pub use ping::{resolve_host, ResolvedHost};
pub use pipeline::{CascRemote, KNOWN_PRODUCTS};
pub use progress::{CancellationToken, Progress, ProgressFn};
pub use region::Region;
pub use tact::{PatchClient, ServerEntry, VersionEntry};

pub use casc_formats::blte::{BlteBlob, BlteDecoder};
