// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use clap::Parser;

#[derive(Parser)]
struct Harness {
    #[command(subcommand)]
    command: HookCommand,
}

#[test]
fn port_end_flags_parse() {
    let parsed = Harness::try_parse_from([
        "hook",
        "port-end",
        "auth",
        "--input-tokens",
        "1200",
        "--output-tokens",
        "340",
        "--cost-usd",
        "0.25",
    ])
    .unwrap();
    match parsed.command {
        HookCommand::PortEnd {
            port_id,
            input_tokens,
            output_tokens,
            cost_usd,
        } => {
            assert_eq!(port_id, "auth");
            assert_eq!(input_tokens, 1200);
            assert_eq!(output_tokens, 340);
            assert!((cost_usd - 0.25).abs() < f64::EPSILON);
        }
        _ => panic!("wrong variant"),
    }
}

#[test]
fn port_end_defaults_to_zero_usage() {
    let parsed = Harness::try_parse_from(["hook", "port-end", "auth"]).unwrap();
    match parsed.command {
        HookCommand::PortEnd {
            input_tokens,
            output_tokens,
            cost_usd,
            ..
        } => {
            assert_eq!(input_tokens, 0);
            assert_eq!(output_tokens, 0);
            assert_eq!(cost_usd, 0.0);
        }
        _ => panic!("wrong variant"),
    }
}

#[test]
fn event_accepts_optional_message() {
    let parsed = Harness::try_parse_from(["hook", "event", "escalation"]).unwrap();
    match parsed.command {
        HookCommand::Event {
            event_type,
            message,
        } => {
            assert_eq!(event_type, "escalation");
            assert!(message.is_none());
        }
        _ => panic!("wrong variant"),
    }
}
