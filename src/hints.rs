/// Command an operator can run to follow the service logs
pub fn logs_command(service: &str) -> String {
    format!("sudo journalctl -u {} -f", service)
}

/// Command an operator can run to restart the service
pub fn restart_command(service: &str) -> String {
    format!("sudo systemctl restart {}", service)
}

pub fn render(service: &str) -> String {
    format!(
        "To view logs: {}\nTo restart:   {}",
        logs_command(service),
        restart_command(service)
    )
}

pub fn print(service: &str) {
    println!("{}", render(service));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hints_contain_service_name() {
        for service in ["fact-checker-api", "billing", "a"] {
            assert!(logs_command(service).contains(service));
            assert!(restart_command(service).contains(service));
        }
    }

    #[test]
    fn test_render() {
        let text = render("fact-checker-api");
        assert_eq!(
            text,
            "To view logs: sudo journalctl -u fact-checker-api -f\n\
             To restart:   sudo systemctl restart fact-checker-api"
        );
    }
}
