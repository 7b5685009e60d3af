pub mod addr;
pub mod clean;
pub mod direct;
pub mod download;
pub mod error;
pub mod fetch;
pub mod history;
pub mod list;
pub mod merge;
pub mod port;
pub mod purge;
pub mod settings;
pub mod ssh;

pub use addr::{RemoteAddr, Scheme, LOCAL_PROXY_HOST};
pub use clean::*;
pub use download::{Downloader, StagedCluster};
pub use error::{Error, Result};
pub use fetch::{RemoteFetch, ScpFetcher};
pub use merge::{merge, MergeOptions, Merged, PortSource};
pub use purge::{purge, PurgeOptions, Purged};
pub use settings::Settings;
