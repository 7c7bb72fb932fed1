use clap::Parser;

/// Single-host process supervisor with a REST control surface.
#[derive(Debug, Parser)]
#[command(name = "procman")]
pub struct Cli {
    /// TCP port for the REST control surface.
    pub port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_port() {
        let cli = Cli::try_parse_from(["procman", "8080"]).unwrap();
        assert_eq!(cli.port, 8080);
    }

    #[test]
    fn missing_port_is_an_error() {
        assert!(Cli::try_parse_from(["procman"]).is_err());
    }

    #[test]
    fn non_integer_port_is_an_error() {
        assert!(Cli::try_parse_from(["procman", "eighty"]).is_err());
    }
}
