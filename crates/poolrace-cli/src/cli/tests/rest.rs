//! Tests for check, config, and bad input.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;

#[test]
fn cli_parse_check() {
    assert!(matches!(parse(&["poolrace", "check"]), CliCommand::Check));
}

#[test]
fn cli_parse_config() {
    assert!(matches!(parse(&["poolrace", "config"]), CliCommand::Config));
}

#[test]
fn cli_requires_subcommand() {
    assert!(Cli::try_parse_from(["poolrace"]).is_err());
}

#[test]
fn cli_rejects_unknown_subcommand() {
    assert!(Cli::try_parse_from(["poolrace", "bench"]).is_err());
}
