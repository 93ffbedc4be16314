pub mod events;
pub mod metadata;
pub mod session;

pub use events::{
    IngestError, IngestEvent, IngestResult, MISSING_FILE_MESSAGE, MISSING_TEXT_MESSAGE,
    MISSING_TITLE_MESSAGE, UPLOAD_BUSY_MESSAGE, UPLOAD_FAILED_MESSAGE, UPLOAD_SUCCESS_MESSAGE,
};
pub use metadata::{
    Category, IngestMode, MetadataField, UnknownCategory, UploadMetadata, UploadOutcome,
    split_tags,
};
pub use session::{IngestSession, IngestSnapshot};
