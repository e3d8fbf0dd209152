//! Plain-text rendering of a [`DashboardView`].
//!
//! The status bar, rotation panel, signal cards and the map marker table
//! are rendered from derived values only; nothing here reads the snapshot.

use std::fmt::Write;

use crate::view::{DashboardView, Severity, SignalCard};

/// Render the full dashboard as a block of text.
pub fn render_dashboard(view: &DashboardView) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_dashboard(&mut out, view);
    out
}

fn write_dashboard(out: &mut String, view: &DashboardView) -> std::fmt::Result {
    write_status_bar(out, view)?;
    writeln!(out)?;
    write_rotation(out, view)?;
    for card in &view.signals {
        writeln!(out)?;
        write_card(out, card)?;
    }
    writeln!(out)?;
    write_map(out, view)?;
    Ok(())
}

fn write_status_bar(out: &mut String, view: &DashboardView) -> std::fmt::Result {
    write!(out, "Status: {}", view.status_line)?;
    if view.stale {
        write!(out, "  [stale]")?;
    }
    writeln!(out)?;
    if let Some(err) = &view.error {
        writeln!(out, "Error: {err}")?;
    }
    Ok(())
}

fn write_rotation(out: &mut String, view: &DashboardView) -> std::fmt::Result {
    writeln!(out, "Signal Rotation")?;
    match (view.active_direction, view.next_direction) {
        (Some(current), Some(next)) => {
            writeln!(out, "  Current Green: {current} → Next: {next}")?
        }
        _ => writeln!(out, "  Current Green: none")?,
    }
    writeln!(out, "  Rotation Order: {}", view.rotation)
}

fn write_card(out: &mut String, card: &SignalCard) -> std::fmt::Result {
    write!(out, "{} Signal", card.direction)?;
    if card.active {
        write!(out, " [Active]")?;
    }
    writeln!(out)?;

    writeln!(out, "  Status: {} ({})", card.status, card.color)?;
    writeln!(
        out,
        "  Vehicles: {} ({})  cars {} / buses {} / trucks {}",
        card.vehicle_count,
        severity_label(card.severity),
        card.breakdown.car,
        card.breakdown.bus,
        card.breakdown.truck,
    )?;
    if let Some(remaining) = &card.time_remaining {
        writeln!(out, "  Time Remaining: {remaining}")?;
    }
    if let Some(wait) = &card.expected_wait {
        writeln!(out, "  Expected Wait Time: {wait}")?;
    }
    if card.emergency {
        writeln!(out, "  !! Emergency Vehicle Present")?;
    }
    Ok(())
}

fn write_map(out: &mut String, view: &DashboardView) -> std::fmt::Result {
    writeln!(out, "Map {}", view.location)?;
    for card in &view.signals {
        writeln!(
            out,
            "  {:<5} {}  {}",
            card.direction.as_str(),
            card.marker,
            card.status
        )?;
    }
    write!(out, "Last Update: {}", view.last_update.to_rfc3339())?;
    if let Some(phase) = &view.phase {
        write!(out, "  Phase: {phase}")?;
    }
    writeln!(out)
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Low => "low",
        Severity::Medium => "medium",
        Severity::High => "high",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ConnectionStatus;
    use crate::types::{Direction, IntersectionSnapshot};
    use chrono::{Duration, TimeZone, Utc};

    fn view_at(offset_secs: i64, status: ConnectionStatus) -> DashboardView {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let mut snap = IntersectionSnapshot::startup_default(t0);
        snap.signals.get_mut(&Direction::East).unwrap().emergency_vehicle = true;
        DashboardView::derive(
            &snap,
            &status,
            t0 + Duration::seconds(offset_secs),
            Duration::seconds(5),
        )
    }

    #[test]
    fn renders_every_panel() {
        let text = render_dashboard(&view_at(3, ConnectionStatus::connected()));

        assert!(text.starts_with("Status: Connected successfully\n"));
        assert!(text.contains("Current Green: North → Next: East"));
        assert!(text.contains("Rotation Order: North → East → South → West"));
        assert!(text.contains("North Signal [Active]"));
        assert!(text.contains("South Signal\n"));
        assert!(text.contains("Time Remaining: 7s"));
        assert!(text.contains("Expected Wait Time: 0s"));
        assert!(text.contains("!! Emergency Vehicle Present"));
        assert!(text.contains("Map (12.9716, 77.5946)"));
        assert!(text.contains("North (12.9726, 77.5946)  Green"));
        assert!(text.contains("Phase: North-South"));
        assert!(!text.contains("[stale]"));
    }

    #[test]
    fn renders_staleness_and_errors() {
        let status = ConnectionStatus::failed("connection refused");
        let text = render_dashboard(&view_at(30, status));

        assert!(text.starts_with("Status: Connection failed  [stale]\n"));
        assert!(text.contains("Error: Failed to connect to server: connection refused"));
        assert!(text.contains("Time Remaining: 0s"));
    }
}
