// External tool detection, installation and updates

use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::{Command, Stdio};
use std::str::FromStr;
use tokio::process::Command as TokioCommand;
use tracing::{info, warn};

use super::errors::DownloadError;
use super::extractors::python_command;
use super::utils::find_executable;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToolType {
    YtDlp,
    /// The `yt_dlp` Python module
    YtDlpModule,
    Ffmpeg,
    Ffprobe,
    Aria2,
}

impl ToolType {
    pub const ALL: [ToolType; 5] = [
        ToolType::YtDlp,
        ToolType::YtDlpModule,
        ToolType::Ffmpeg,
        ToolType::Ffprobe,
        ToolType::Aria2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::YtDlpModule => "yt_dlp (python)",
            ToolType::Ffmpeg => "ffmpeg",
            ToolType::Ffprobe => "ffprobe",
            ToolType::Aria2 => "aria2c",
        }
    }

    /// Package that provides the tool
    fn package(&self) -> &'static str {
        match self {
            ToolType::YtDlp | ToolType::YtDlpModule => "yt-dlp",
            ToolType::Ffmpeg | ToolType::Ffprobe => "ffmpeg",
            ToolType::Aria2 => "aria2",
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolType::Ffmpeg | ToolType::Ffprobe => "-version",
            _ => "--version",
        }
    }
}

impl fmt::Display for ToolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "yt-dlp" | "ytdlp" => Ok(ToolType::YtDlp),
            "yt_dlp" | "python" => Ok(ToolType::YtDlpModule),
            "ffmpeg" => Ok(ToolType::Ffmpeg),
            "ffprobe" => Ok(ToolType::Ffprobe),
            "aria2" | "aria2c" => Ok(ToolType::Aria2),
            other => Err(format!("Unknown tool type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<String>,
    pub is_available: bool,
}

/// Host operating system, as far as installation is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    MacOs,
    Linux,
    Windows,
    Other,
}

impl Os {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "macos" => Os::MacOs,
            "linux" => Os::Linux,
            "windows" => Os::Windows,
            _ => Os::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl InstallCommand {
    fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl fmt::Display for InstallCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.program, self.args.join(" "))
    }
}

/// How a tool gets installed on this machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallPlan {
    /// Run these in order
    Commands(Vec<InstallCommand>),
    /// Nothing we can run; show the user these instructions
    Manual(String),
}

/// Work out the install (or upgrade) commands for `tool`.
///
/// `has_command` reports whether a package manager is on PATH.
pub fn install_plan(
    tool: ToolType,
    os: Os,
    has_command: impl Fn(&str) -> bool,
    upgrade: bool,
) -> InstallPlan {
    let package = tool.package();

    if package == "yt-dlp" {
        return InstallPlan::Commands(vec![InstallCommand::new(
            &python_command(),
            &["-m", "pip", "install", "--upgrade", "yt-dlp"],
        )]);
    }

    match os {
        Os::MacOs if has_command("brew") => InstallPlan::Commands(vec![InstallCommand::new(
            "brew",
            &[if upgrade { "upgrade" } else { "install" }, package],
        )]),
        Os::MacOs => InstallPlan::Manual(format!(
            "Install Homebrew (https://brew.sh), then run: brew install {}",
            package
        )),
        Os::Linux if has_command("apt") => InstallPlan::Commands(vec![
            InstallCommand::new("sudo", &["apt", "update"]),
            InstallCommand::new("sudo", &["apt", "install", "-y", package]),
        ]),
        Os::Linux if has_command("yum") => InstallPlan::Commands(vec![InstallCommand::new(
            "sudo",
            &["yum", if upgrade { "update" } else { "install" }, "-y", package],
        )]),
        Os::Linux if has_command("pacman") => InstallPlan::Commands(vec![InstallCommand::new(
            "sudo",
            &["pacman", "-S", "--noconfirm", package],
        )]),
        Os::Windows => InstallPlan::Manual(match tool {
            ToolType::Aria2 => {
                "Download aria2 from https://github.com/aria2/aria2/releases and add aria2c.exe to PATH"
                    .to_string()
            }
            _ => "Download ffmpeg from https://ffmpeg.org/download.html and add its bin folder to PATH"
                .to_string(),
        }),
        _ => InstallPlan::Manual(format!(
            "No supported package manager found. Install {} with your system's package manager.",
            package
        )),
    }
}

/// Pull the version number out of a tool's version banner
fn parse_version(tool: ToolType, stdout: &str) -> Option<String> {
    let first = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    match tool {
        ToolType::YtDlp | ToolType::YtDlpModule => Some(first.to_string()),
        // "ffmpeg version 6.1.1 Copyright ..." / "aria2 version 1.37.0"
        _ => {
            let mut words = first.split_whitespace();
            words
                .by_ref()
                .find(|w| *w == "version")
                .and_then(|_| words.next())
                .map(str::to_string)
                .or_else(|| Some(first.to_string()))
        }
    }
}

pub struct ToolManager;

impl ToolManager {
    pub fn new() -> Self {
        Self
    }

    pub fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let (path, version) = self.detect_tool(tool_type);

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            version,
            is_available: path.is_some(),
            path,
        }
    }

    pub fn get_all_tools(&self) -> Vec<ToolInfo> {
        ToolType::ALL
            .iter()
            .map(|tool| self.get_tool_info(*tool))
            .collect()
    }

    pub fn is_installed(&self, tool_type: ToolType) -> bool {
        self.detect_tool(tool_type).0.is_some()
    }

    fn detect_tool(&self, tool_type: ToolType) -> (Option<String>, Option<String>) {
        if tool_type == ToolType::YtDlpModule {
            let python = python_command();
            let output = Command::new(&python)
                .args(["-c", "import yt_dlp.version; print(yt_dlp.version.__version__)"])
                .stderr(Stdio::null())
                .output();
            return match output {
                Ok(out) if out.status.success() => (
                    Some(python),
                    parse_version(tool_type, &String::from_utf8_lossy(&out.stdout)),
                ),
                _ => (None, None),
            };
        }

        match find_executable(tool_type.as_str()) {
            Some(path) => {
                let version = self.get_version(&path.to_string_lossy(), tool_type);
                (Some(path.to_string_lossy().to_string()), version)
            }
            None => (None, None),
        }
    }

    fn get_version(&self, path: &str, tool_type: ToolType) -> Option<String> {
        match Command::new(path).arg(tool_type.version_arg()).output() {
            Ok(output) if output.status.success() => {
                parse_version(tool_type, &String::from_utf8_lossy(&output.stdout))
            }
            _ => None,
        }
    }

    /// Install `tool` with the platform's package manager
    pub async fn install(&self, tool: ToolType) -> Result<(), DownloadError> {
        self.run_plan(tool, false).await
    }

    /// Upgrade `tool` to the latest release
    pub async fn update(&self, tool: ToolType) -> Result<(), DownloadError> {
        self.run_plan(tool, true).await
    }

    async fn run_plan(&self, tool: ToolType, upgrade: bool) -> Result<(), DownloadError> {
        let plan = install_plan(tool, Os::current(), |cmd| find_executable(cmd).is_some(), upgrade);

        let commands = match plan {
            InstallPlan::Commands(commands) => commands,
            InstallPlan::Manual(instructions) => {
                warn!("[Tools] Cannot install {} automatically", tool);
                return Err(DownloadError::ToolNotFound(instructions));
            }
        };

        for command in commands {
            info!("[Tools] Running: {}", command);
            let status = TokioCommand::new(&command.program)
                .args(&command.args)
                .status()
                .await
                .map_err(|e| DownloadError::Execution(format!("Failed to run {}: {}", command, e)))?;

            if !status.success() {
                return Err(DownloadError::Execution(format!(
                    "'{}' exited with {}",
                    command, status
                )));
            }
        }

        info!("[Tools] {} {}", tool, if upgrade { "updated" } else { "installed" });
        Ok(())
    }
}

impl Default for ToolManager {
    fn default() -> Self {
        Self::new()
    }
}
