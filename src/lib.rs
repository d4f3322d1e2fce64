// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Idempotent provisioning of Debian and Ubuntu hosts.
//!
//! Hostprep turns a fresh VPS, WSL2 instance, or mini PC into a usable
//! machine by running an ordered listing of __steps__: install packages,
//! configure locale and shell, tune the kernel, harden SSH, and so on.
//! Running it again on an already provisioned host changes nothing.
//!
//! # Building Blocks
//!
//! - [`package`]: install what the package index can provide, skip the rest.
//! - [`prompt`]: ask yes/no questions, or fall back to defaults when there is
//!   nobody to ask.
//! - [`materialize`]: render configuration files from templates, and write
//!   them only when their content changes, backing up what was there.
//! - [`step`]: run steps in order, and decide what a failure means for the
//!   run.
//!
//! The concrete steps live in [`steps`], and are driven entirely by a
//! [`config::ProvisionConfig`].

pub mod config;
pub mod download;
pub mod exec;
pub mod host;
pub mod materialize;
pub mod package;
pub mod path;
pub mod prompt;
pub mod runlog;
pub mod step;
pub mod steps;
