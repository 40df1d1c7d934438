use glob::glob;

// Console cables used on controller serial ports.
const PATTERNS: &[&str] = &[
    "/dev/ttyUSB*",
    "/dev/ttyACM*",
    "/dev/ttyS[0-9]*",
    "/dev/cu.usbserial*",
    "/dev/cu.usbmodem*",
    "/dev/cu.PL2303*",
    "/dev/tty.usbserial*",
    "/dev/tty.usbmodem*",
];

fn collect_candidates() -> Vec<String> {
    let mut out = Vec::new();
    for pattern in PATTERNS {
        let Ok(entries) = glob(pattern) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.display().to_string();
            if !out.iter().any(|existing| existing == &path) {
                out.push(path);
            }
        }
    }
    out
}

pub fn detect_port() -> Option<String> {
    let mut candidates = collect_candidates();
    if let Some(hint) = crate::env_utils::env_opt("TXSWEEP_TTY_HINT") {
        candidates.retain(|c| c.contains(&hint));
    }
    pick_candidate(candidates)
}

/// Prefers USB console adapters over on-board UARTs; ambiguous sets yield `None`.
fn pick_candidate(candidates: Vec<String>) -> Option<String> {
    let usb_ports: Vec<_> = candidates
        .iter()
        .filter(|c| {
            c.starts_with("/dev/ttyUSB")
                || c.starts_with("/dev/ttyACM")
                || c.starts_with("/dev/cu.")
        })
        .cloned()
        .collect();
    if usb_ports.len() == 1 {
        return usb_ports.into_iter().next();
    }
    if usb_ports.len() > 1 {
        return None;
    }

    if candidates.len() == 1 {
        return candidates.into_iter().next();
    }

    None
}

pub fn list_candidates() -> Vec<String> {
    collect_candidates()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_usb_adapter_wins_over_onboard_uarts() {
        let picked = pick_candidate(vec![
            "/dev/ttyS0".to_string(),
            "/dev/ttyS1".to_string(),
            "/dev/ttyUSB0".to_string(),
        ]);
        assert_eq!(picked.as_deref(), Some("/dev/ttyUSB0"));
    }

    #[test]
    fn ambiguous_usb_adapters_are_not_guessed() {
        let picked = pick_candidate(vec!["/dev/ttyUSB0".to_string(), "/dev/ttyUSB1".to_string()]);
        assert_eq!(picked, None);
    }

    #[test]
    fn lone_onboard_uart_is_used() {
        let picked = pick_candidate(vec!["/dev/ttyS0".to_string()]);
        assert_eq!(picked.as_deref(), Some("/dev/ttyS0"));
    }
}
