//! WebDAV protocol core: request grammars, lock bookkeeping,
//! conditional (`If:`) evaluation and multistatus rendering, following
//! RFC 4918 with a few RFC 2518 leftovers (`source`, tagged-list
//! productions).
//!
//! Storage stays out: callers plug a [`catalog::ResourceAdapter`] in
//! and drive the pieces from their HTTP method handlers. Nothing here
//! performs I/O beyond the XML streams it is handed.

// utils
pub mod error;
pub mod namespace;
pub mod xml;

// webdav
pub mod conditional;
pub mod decoder;
pub mod encoder;
pub mod lock;
pub mod types;

// higher level
pub mod catalog;
pub mod multistatus;
