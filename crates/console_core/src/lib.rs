//! Headless core of the service inspector console.
//!
//! Views render into an in-memory [`document::Document`] and talk to the
//! outside world through the traits in [`environment`]. Nothing here owns a
//! thread; the host drives event delivery and the timer clock.

pub mod binding;
pub mod document;
pub mod environment;
pub mod error;
pub mod forms;
pub mod machines;
pub mod scheduler;
pub mod selector;
pub mod templates;
pub mod textarea;
pub mod viewlet;

pub use binding::{BindingEngine, BindingUpdate, ConflictPolicy, Resolution};
pub use document::{el, Document, ElementSpec, NodeId};
pub use environment::{
    CharmStore, Environment, EnvironmentHandle, HttpEnvironment, InMemoryCharmStore,
    InMemoryEnvironment, NotificationLog, NotificationSink,
};
pub use error::{CollectionError, FileReadError, SubmissionError, ValidationError, ViewError};
pub use machines::{ClientKey, CollectionEvent, MachineList, MachineViewPanel};
pub use viewlet::{
    config::{ConfigViewlet, ConfigViewletDeps, SaveOutcome, SubmitResult, ViewletAction},
    DomEvent, ViewletOptions,
};
