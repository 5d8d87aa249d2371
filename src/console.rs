//! Colorful console output for startup and route generation.

use num_format::{Locale, ToFormattedString};
use owo_colors::OwoColorize;
use std::time::{Duration, Instant};

use crate::domain::{RoutePlan, TravelMode};
use crate::routing::Center;

/// ASCII art banner for service startup.
pub fn print_banner() {
    let banner = r#"
  _____                    ____             _   _
 |_   _|__  _   _ _ __    |  _ \ ___  _   _| |_(_)_ __   __ _
   | |/ _ \| | | | '__|   | |_) / _ \| | | | __| | '_ \ / _` |
   | | (_) | |_| | |      |  _ < (_) | |_| | |_| | | | | (_| |
   |_|\___/ \__,_|_|      |_| \_\___/ \__,_|\__|_|_| |_|\__, |
                                                        |___/
"#;
    println!("{}", banner.cyan().bold());
    println!(
        "  {} {}\n",
        format!("v{}", env!("CARGO_PKG_VERSION")).bright_black(),
        "Tour Routing".bright_cyan()
    );
}

/// Prints the catalog and road network settings.
pub fn print_config(site_count: usize, center: Center, radius_m: f64) {
    println!(
        "{} {} {} Catalog: sites ({}), center ({}, {}), road radius ({}m)",
        timestamp().bright_black(),
        "INFO".bright_green(),
        "[Planner]".bright_cyan(),
        site_count.to_formatted_string(&Locale::en).bright_yellow(),
        format!("{:.5}", center.lat).bright_yellow(),
        format!("{:.5}", center.lon).bright_yellow(),
        (radius_m.round() as u64).to_formatted_string(&Locale::en).bright_yellow()
    );
}

/// Prints road network size after loading.
pub fn print_road_network(node_count: usize, segment_count: usize, total_km: f64) {
    println!(
        "{} {} {} Road network: nodes ({}), segments ({}), length ({})",
        timestamp().bright_black(),
        "INFO".bright_green(),
        "[Roads]".bright_cyan(),
        node_count.to_formatted_string(&Locale::en).bright_yellow(),
        segment_count.to_formatted_string(&Locale::en).bright_yellow(),
        format!("{:.1} km", total_km).bright_magenta()
    );
}

/// Prints "Route started" message.
pub fn print_route_started(mode: TravelMode, stop_count: usize) {
    let strategy = if mode.uses_optimization(stop_count) {
        "trip optimization"
    } else {
        "pairwise"
    };
    println!(
        "{} {} {} Routing started: mode ({}), stops ({}), strategy ({})",
        timestamp().bright_black(),
        "INFO".bright_green(),
        "[Router]".bright_cyan(),
        mode.as_str().white().bold(),
        stop_count.to_string().yellow(),
        strategy.white()
    );
}

/// Prints a failed route generation.
pub fn print_route_failed(elapsed: Duration, message: &str) {
    println!(
        "{} {} {} Routing failed after {}: {}",
        timestamp().bright_black(),
        "WARN".bright_red(),
        "[Router]".bright_cyan(),
        format_duration(elapsed).yellow(),
        message
    );
}

/// Prints a route summary box.
pub fn print_route_ended(plan: &RoutePlan, elapsed: Duration) {
    println!(
        "{} {} {} Routing ended: time spent ({}), legs ({})",
        timestamp().bright_black(),
        "INFO".bright_green(),
        "[Router]".bright_cyan(),
        format_duration(elapsed).yellow(),
        plan.legs().len().to_string().white()
    );

    // 60 chars wide, 56 char content area
    println!();
    println!("{}", "╔══════════════════════════════════════════════════════════╗".bright_cyan());

    let status_text = if plan.optimized() {
        "✓ OPTIMIZED ROUTE"
    } else {
        "✓ ROUTE IN SELECTED ORDER"
    };
    let status_padding = 56 - status_text.chars().count();
    let left_pad = status_padding / 2;
    let right_pad = status_padding - left_pad;
    println!(
        "{}{}{}{}{}",
        "║".bright_cyan(),
        " ".repeat(left_pad),
        status_text.bright_green().bold(),
        " ".repeat(right_pad),
        "║".bright_cyan()
    );

    println!("{}", "╠══════════════════════════════════════════════════════════╣".bright_cyan());

    let rows = [
        ("Mode:", plan.mode().as_str().to_string()),
        ("Stops:", plan.visit_order().len().to_string()),
        ("Duration:", format_minutes(plan.total_duration_minutes())),
        ("Distance:", format!("{:.2} km", plan.total_distance_km())),
    ];
    for (label, value) in rows {
        println!(
            "{}  {:<18}{:>36}  {}",
            "║".bright_cyan(),
            label,
            value,
            "║".bright_cyan()
        );
    }

    println!("{}", "╠══════════════════════════════════════════════════════════╣".bright_cyan());
    for (idx, name) in plan.visit_order().iter().enumerate() {
        let line = truncate(&format!("{:>2}. {}", idx + 1, name), 54);
        println!("{}  {:<54}  {}", "║".bright_cyan(), line, "║".bright_cyan());
    }

    println!("{}", "╚══════════════════════════════════════════════════════════╝".bright_cyan());
    println!();
}

/// Formats a duration nicely.
fn format_duration(d: Duration) -> String {
    let total_ms = d.as_millis();
    if total_ms < 1000 {
        format!("{}ms", total_ms)
    } else if total_ms < 60_000 {
        format!("{:.2}s", d.as_secs_f64())
    } else {
        let mins = total_ms / 60_000;
        let secs = (total_ms % 60_000) / 1000;
        format!("{}m {}s", mins, secs)
    }
}

/// Formats travel minutes as `1h 05m` or `12.5 min`.
fn format_minutes(minutes: f64) -> String {
    if minutes >= 60.0 {
        let total = minutes.round() as u64;
        format!("{}h {:02}m", total / 60, total % 60)
    } else {
        format!("{:.1} min", minutes)
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max_chars - 1).collect();
        out.push('…');
        out
    }
}

/// Returns a timestamp string.
fn timestamp() -> String {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| format!("{}.{:03}", d.as_secs(), d.subsec_millis()))
        .unwrap_or_else(|_| "0.000".to_string())
}

/// Times one route generation and prints its outcome.
pub struct RouteTimer {
    start: Instant,
}

impl RouteTimer {
    pub fn start(mode: TravelMode, stop_count: usize) -> Self {
        print_route_started(mode, stop_count);
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn finish<E: std::fmt::Display>(self, result: &Result<RoutePlan, E>) {
        match result {
            Ok(plan) => print_route_ended(plan, self.elapsed()),
            Err(e) => print_route_failed(self.elapsed(), &e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
    }

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(12.46), "12.5 min");
        assert_eq!(format_minutes(65.0), "1h 05m");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Sangdangsanseong Fortress", 10), "Sangdangs…");
    }
}
