#![forbid(unsafe_code)]

//! Check orchestration daemon: receives GitHub webhooks, queues check
//! records and runs them against the remote execution service.

pub mod cloud;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod executors;
pub mod http;
pub mod platform;
pub mod queue;
pub mod remote;
pub mod service;
pub mod setup;
pub mod status_check;
pub mod supervisor;
pub mod webhook;
