pub mod state;

pub use state::{
    AppSettings, ChatSettings, IngestSettings, SettingsError, SettingsOrigin, SettingsStore,
    TransportSettings,
};
