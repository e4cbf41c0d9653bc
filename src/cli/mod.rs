use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliAction {
    PrintVersion,
    InitConfig,
    Run { playlist: Option<PathBuf> },
}

pub fn parse_args() -> CliAction {
    parse_args_from(env::args().skip(1))
}

/// Parses everything after the executable name.
pub fn parse_args_from<I, S>(args: I) -> CliAction
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut version_flag = false;
    let mut init_config = false;
    let mut playlist = None;
    for arg in args {
        match arg.as_ref() {
            "--version" | "-V" | "-version" => version_flag = true,
            "--init-config" => init_config = true,
            flag if flag.starts_with('-') => {}
            path => playlist = Some(PathBuf::from(path)),
        }
    }
    if version_flag {
        return CliAction::PrintVersion;
    }
    if init_config {
        return CliAction::InitConfig;
    }
    CliAction::Run { playlist }
}

pub fn print_version() {
    println!("Tandem v{}", env!("CARGO_PKG_VERSION"));
}

pub fn init_config_file() {
    use std::fs;
    use std::path::Path;
    let target = Path::new("tandem.toml");
    if target.exists() {
        eprintln!("tandem.toml already exists; aborting --init-config");
        return;
    }
    if let Err(e) = fs::write(target, crate::config::DEFAULT_CONFIG_TEMPLATE) {
        eprintln!("Failed to write tandem.toml: {e}");
    } else {
        println!("Created tandem.toml");
    }
}
