// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Template catalog and content renderer.
//!
//! Templates are immutable and built once at start-up. Rendering replaces
//! `{{key}}` tokens from a variable map and leaves unknown keys untouched.

pub mod catalog;
pub mod render;

pub use catalog::{ScheduleSpec, Template, TemplateCatalog};
pub use render::{placeholders, render, render_buttons};
