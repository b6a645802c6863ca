use anyhow::{Result, bail};
use std::path::PathBuf;
use std::time::Duration;

/// Command-line options of the demo player.
#[derive(Debug, Clone)]
pub struct Options {
    /// File to stream; a generated tone plays when absent.
    pub path: Option<PathBuf>,
    pub looped: bool,
    pub seconds: f32,
    /// Orbit radius of the emitter in meters; 0 plays without spatialization.
    pub orbit: f32,
    pub reverb: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            path: None,
            looped: false,
            seconds: 10.0,
            orbit: 3.0,
            reverb: false,
        }
    }
}

impl Options {
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f32(self.seconds.max(0.0))
    }
}

pub const USAGE: &str = "usage: resound-demo [--loop] [--reverb] [--seconds N] [--orbit METERS] [FILE]";

/// Parses the process arguments (without the program name).
pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Options> {
    let mut options = Options::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--loop" => options.looped = true,
            "--reverb" => options.reverb = true,
            "--seconds" => options.seconds = number(&arg, args.next())?,
            "--orbit" => options.orbit = number(&arg, args.next())?,
            "-h" | "--help" => bail!(USAGE),
            flag if flag.starts_with("--") => bail!("unknown option {}\n{}", flag, USAGE),
            path => {
                if options.path.is_some() {
                    bail!("only one file can be played\n{}", USAGE);
                }
                options.path = Some(PathBuf::from(path));
            }
        }
    }
    Ok(options)
}

fn number(flag: &str, value: Option<String>) -> Result<f32> {
    let Some(value) = value else {
        bail!("{} needs a value", flag);
    };
    match value.parse::<f32>() {
        Ok(n) if n.is_finite() && n >= 0.0 => Ok(n),
        _ => bail!("{} expects a non-negative number, got {:?}", flag, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_flags_and_path() {
        let options = parse(args(&["--loop", "--seconds", "2.5", "music.ogg"])).unwrap();
        assert!(options.looped);
        assert_eq!(options.seconds, 2.5);
        assert_eq!(options.path, Some(PathBuf::from("music.ogg")));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse(args(&["--orbit"])).is_err());
        assert!(parse(args(&["--seconds", "-1"])).is_err());
        assert!(parse(args(&["--nope"])).is_err());
        assert!(parse(args(&["a.wav", "b.wav"])).is_err());
    }
}
