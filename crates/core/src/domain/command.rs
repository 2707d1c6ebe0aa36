// Command Line Domain Model

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A ready-to-run invocation of the external tool
///
/// Argument assembly happens upstream; the supervisor runs this as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Extra variables set on top of the inherited (allowlisted) environment
    pub env: HashMap<String, String>,
    pub working_dir: PathBuf,
}

impl CommandLine {
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: working_dir.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Program name without directories, for log fields
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_whitespace() {
        let cmd = CommandLine::new("/usr/bin/ffmpeg", "/tmp")
            .args(["-i", "my movie.mkv"])
            .arg("out_%05d.jpg");

        assert_eq!(
            cmd.to_string(),
            "/usr/bin/ffmpeg -i \"my movie.mkv\" out_%05d.jpg"
        );
    }

    #[test]
    fn test_program_name() {
        let cmd = CommandLine::new("/opt/ffmpeg/bin/ffmpeg", ".");
        assert_eq!(cmd.program_name(), "ffmpeg");

        let bare = CommandLine::new("ffmpeg", ".");
        assert_eq!(bare.program_name(), "ffmpeg");
    }
}
