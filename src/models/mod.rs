mod cancel;
mod fetch;
mod layout;
mod manifest;
mod orchestrator;
mod progress;

pub use cancel::{CancelFlag, Cancelled};
pub use fetch::{fetch_to_temp, FetchedFile};
pub use layout::{
    Model, ModelPaths, StoreLayout, FILE_NAME_FINISHED, FILE_NAME_MLC_CHAT_CONFIG,
    FILE_NAME_NDARRAY_CACHE,
};
pub use manifest::{MlcChatConfig, NdarrayCache, NdarrayCacheRecord};
pub use orchestrator::{DownloadOrchestrator, DownloadPhase};
pub use progress::{DownloadProgress, RECORD_SCALE};
