//! Module-boundary transforms for React Server Components.
//!
//! A single file is compiled at a time. Modules carrying a `"use client"`,
//! `"use server"` or `"use dom"` directive are rewritten into the form the
//! current graph (react-server, SSR, client or native) needs, and functions
//! carrying an inline `"use server"` directive are hoisted into registered
//! server references. See [`transform`] for the entry point.

use std::hash::BuildHasherDefault;

use rustc_hash::FxHasher;

pub mod config;
pub mod context;
pub mod diagnostics;
pub mod metadata;
mod pipeline;
pub mod transforms;

pub use crate::{
    config::{Caller, Platform},
    context::FileCompilationContext,
    diagnostics::{Diagnostic, LineColumn, Severity, SourceRange, TransformError},
    metadata::{ReactServerActions, TransformMetadata},
    pipeline::{TransformOutput, transform},
};

pub type FxIndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasherDefault<FxHasher>>;
pub type FxIndexSet<K> = indexmap::IndexSet<K, BuildHasherDefault<FxHasher>>;
