use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about = "Language server for SLiM and Eidos scripts")]
pub(crate) struct Cli {
    #[arg(long)]
    pub listen: bool,
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    /// Directory of documentation JSON files replacing the built-in set
    #[arg(long)]
    pub docs: Option<PathBuf>,
    /// Run diagnostics on the provided files and print results to stdout
    #[arg(long, num_args = 1..)]
    pub diagnose: Vec<PathBuf>,
    /// Analysis mode for --diagnose (slim or eidos); defaults to the file extension
    #[arg(long, value_parser = parse_mode)]
    pub mode: Option<slimlsp::Mode>,
}

fn parse_mode(value: &str) -> Result<slimlsp::Mode, String> {
    slimlsp::Mode::parse(value).ok_or_else(|| format!("unknown mode '{value}', expected slim or eidos"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_diagnose_mode() {
        let cli = Cli::parse_from(["slimlsp", "--mode", "eidos", "--diagnose", "a.eidos", "b.slim"]);
        assert_eq!(cli.mode, Some(slimlsp::Mode::Eidos));
        assert_eq!(cli.diagnose.len(), 2);
        assert!(Cli::try_parse_from(["slimlsp", "--mode", "python"]).is_err());
    }
}
