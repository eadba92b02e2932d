use clap::ValueEnum;
use colored::Colorize;

use crate::config::Policy;
use crate::error::Result;
use crate::model::ClaimRecord;
use crate::scenario::{ScenarioReport, StepReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Pretty,
}

pub fn print_claim(claim: &ClaimRecord, format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(claim)?),
        Format::Pretty => {
            println!("{} {}", claim.group.bold(), claim.zone_id.dimmed());
            println!(
                "  claimed by {} at {} | radius {:.1} at {}",
                claim.claimed_by,
                claim.claimed_at.to_rfc3339(),
                claim.radius,
                claim.position
            );
            match (claim.expires_at, claim.zone_erased) {
                (_, true) => println!("  zone: {}", "erased".yellow()),
                (Some(at), false) => println!("  zone: live until {}", at.to_rfc3339()),
                (None, false) => println!("  zone: live (no expiry)"),
            }
        }
    }
    Ok(())
}

pub fn print_claims(claims: &[ClaimRecord], format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(claims)?),
        Format::Pretty => {
            if claims.is_empty() {
                println!("no claims recorded");
            }
            for claim in claims {
                print_claim(claim, Format::Pretty)?;
            }
        }
    }
    Ok(())
}

pub fn print_policy(policy: &Policy, format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(policy)?),
        Format::Pretty => {
            let window = match policy.activation_window_secs {
                Some(secs) => format!("{secs}s after start"),
                None => "unlimited".to_string(),
            };
            let allowed = match policy.allow_list() {
                Some(groups) => groups.join(", "),
                None => "any group".to_string(),
            };
            println!("activation window: {window}");
            if let Some(start) = policy.window_started_at {
                println!("window start:      {}", start.to_rfc3339());
            }
            println!("zone radius:       {:.1}", policy.zone_radius);
            println!("allowed groups:    {allowed}");
            println!("target kinds:      {}", policy.target_kinds.join(", "));
            println!("permission:        {}", policy.permission);
            println!("command:           {}", policy.command);
            println!("existing zones:    {}", policy.existing_zone_check);
            println!("zone flags:");
            for (key, value) in &policy.zone_flags {
                println!("  {key} = {value}");
            }
        }
    }
    Ok(())
}

fn pretty_step(step: &StepReport) {
    let result = match step.result.as_str() {
        "created" => step.result.green(),
        "applied" | "ignored" => step.result.normal(),
        _ => step.result.red(),
    };
    let fired = if step.timers_fired > 0 {
        format!(" (+{} timer)", step.timers_fired)
    } else {
        String::new()
    };
    println!("{:>8.2}s  {:<22} {}{}", step.at_secs, step.action, result, fired);
    if let Some(ref message) = step.message {
        println!("           {}", message.dimmed());
    }
}

pub fn print_report(report: &ScenarioReport, format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(report)?),
        Format::Pretty => {
            println!("reference start: {}", report.reference_start.to_rfc3339());
            for step in &report.steps {
                pretty_step(step);
            }
            if report.timers_fired_after > 0 {
                println!("after last step: {} timer(s) fired", report.timers_fired_after);
            }
            println!(
                "zone calls: {} create, {} erase; live zones: {}",
                report.zone_creates.len(),
                report.zone_erases.len(),
                if report.live_zones.is_empty() {
                    "-".to_string()
                } else {
                    report.live_zones.join(", ")
                }
            );
            println!("prompt calls: {}", report.prompt_calls.len());
            print_claims(&report.claims, Format::Pretty)?;
        }
    }
    Ok(())
}
