//! UI layer: the scripted console session.

pub mod session;
