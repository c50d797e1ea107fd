// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Shared schemas, enums, and configuration for the address-space snapshot system.

pub mod types;
pub mod config;
