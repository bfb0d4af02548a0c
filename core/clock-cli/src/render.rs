//! Plain-text rendering of daemon replies.

use tickclock_core::format::{format_hms, format_hours_minutes};
use tickclock_daemon_protocol::TimerStateView;

/// One line per tracked item, the running one first and marked with `*`.
pub fn status_lines(state: &TimerStateView) -> Vec<String> {
    if state.totals.is_empty() {
        return vec!["No timers recorded".to_string()];
    }

    let mut items: Vec<&String> = state.totals.keys().collect();
    items.sort_by_key(|item_id| state.active_item.as_ref() != Some(*item_id));

    items
        .into_iter()
        .map(|item_id| {
            let running = state.active_item.as_ref() == Some(item_id);
            let total = state.current_total(item_id);
            let mut line = format!(
                "{} {:<12} {}",
                if running { "*" } else { " " },
                item_id,
                format_hms(total)
            );
            if let Some(phase) = state
                .phases
                .get(item_id)
                .and_then(|breakdown| breakdown.current_phase.as_deref())
            {
                line.push_str(&format!("  [{}]", phase));
            }
            if let Some(title) = state.titles.get(item_id) {
                line.push_str(&format!("  {}", title));
            }
            line
        })
        .collect()
}

/// Per-phase breakdown of one item, phases in alphabetical order.
pub fn phase_lines(state: &TimerStateView, item_id: &str) -> Vec<String> {
    let Some(breakdown) = state.phases.get(item_id) else {
        return vec![format!("No phase data for {}", item_id)];
    };
    breakdown
        .per_phase_secs
        .iter()
        .map(|(phase, secs)| {
            let marker = if breakdown.current_phase.as_deref() == Some(phase.as_str()) {
                "*"
            } else {
                " "
            };
            format!("{} {:<16} {}", marker, phase, format_hours_minutes(*secs))
        })
        .collect()
}

/// Parses `90`, `45s`, `15m`, `2h` or combinations such as `1h30m` into seconds.
pub fn parse_duration(input: &str) -> Result<i64, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("duration is empty".to_string());
    }
    if let Ok(seconds) = input.parse::<i64>() {
        return Ok(seconds);
    }

    let mut total: i64 = 0;
    let mut digits = String::new();
    for ch in input.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let unit = match ch {
            'h' | 'H' => 3600,
            'm' | 'M' => 60,
            's' | 'S' => 1,
            _ => return Err(format!("unexpected '{}' in duration {}", ch, input)),
        };
        let value: i64 = digits
            .parse()
            .map_err(|_| format!("missing number before '{}' in {}", ch, input))?;
        total = value
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| format!("duration {} is too large", input))?;
        digits.clear();
    }
    if !digits.is_empty() {
        return Err(format!("missing unit after {} in {}", digits, input));
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tickclock_daemon_protocol::PhaseBreakdownView;

    fn state() -> TimerStateView {
        let mut state = TimerStateView::default();
        state.totals.insert("T1".to_string(), 65);
        state.totals.insert("T2".to_string(), 3600);
        state.titles.insert("T2".to_string(), "Fix login".to_string());
        state.active_item = Some("T2".to_string());
        state.live_elapsed_secs = 30;
        state.phases.insert(
            "T2".to_string(),
            PhaseBreakdownView {
                per_phase_secs: BTreeMap::from([
                    ("BACKLOG".to_string(), 1800),
                    ("NOVO".to_string(), 1800),
                ]),
                current_phase: Some("BACKLOG".to_string()),
                last_change_at: None,
            },
        );
        state
    }

    #[test]
    fn running_item_is_listed_first_with_live_time() {
        let lines = status_lines(&state());
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("* T2"));
        assert!(lines[0].contains("01:00:30"));
        assert!(lines[0].contains("[BACKLOG]"));
        assert!(lines[0].ends_with("Fix login"));
        assert!(lines[1].contains("00:01:05"));
    }

    #[test]
    fn empty_state_has_a_message() {
        assert_eq!(
            status_lines(&TimerStateView::default()),
            vec!["No timers recorded".to_string()]
        );
    }

    #[test]
    fn phase_breakdown_marks_current_phase() {
        let lines = phase_lines(&state(), "T2");
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("* BACKLOG"));
        assert!(lines[1].contains("30min"));
        assert_eq!(phase_lines(&state(), "T9"), vec!["No phase data for T9"]);
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("90"), Ok(90));
        assert_eq!(parse_duration("45s"), Ok(45));
        assert_eq!(parse_duration("15m"), Ok(900));
        assert_eq!(parse_duration("1h30m"), Ok(5400));
        assert_eq!(parse_duration("-60"), Ok(-60));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("1h30").is_err());
        assert!(parse_duration("h").is_err());
    }
}
