// ai
//! # Previously, on pgshift...
//!
//! 🎬 The rows were trapped. Stranded between a database and a warehouse like a traveler
//! stuck in a connecting airport with no WiFi and a dead phone. Someone had to move them.
//! Someone had to be brave. Someone had to write backends so simple they live entirely
//! in RAM, gone the moment you blink.
//!
//! That someone was this module.
//!
//! - [`InMemorySource`]: a catalog and a canned `COPY` stream per table
//! - [`InMemoryObjectStore`]: a `BTreeMap` pretending to be a bucket
//! - [`InMemoryWarehouse`]: a notebook that writes down every statement it's handed
//!
//! All three share their state behind `Arc<Mutex<...>>` so a test can clone one, hand
//! the clone to the supervisor, and inspect the original afterwards. Great for
//! assertions, great for trust issues, great for both.
//!
//! ⚠️ This is NOT for production. This is for tests. If you're deploying this
//! to prod, please also deploy a therapist. 🦆

mod in_mem_object_store;
mod in_mem_source;
mod in_mem_warehouse;

pub(crate) use in_mem_object_store::InMemoryObjectStore;
pub(crate) use in_mem_source::InMemorySource;
pub(crate) use in_mem_warehouse::InMemoryWarehouse;
