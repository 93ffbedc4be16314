pub mod chat;
pub mod console;
pub mod ingest;
pub mod settings;

#[cfg(test)]
mod testing;
