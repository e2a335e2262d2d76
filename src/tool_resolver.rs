//! # Tool Path Resolver
//!
//! This module finds the external binaries the pipeline shells out to
//! (`ffmpeg`, `ffprobe`, accelerator probes such as `nvidia-smi`):
//! - An explicit tools directory (`FRAME_PIPELINE_TOOLS_DIR`)
//! - System-installed tools on `PATH`

use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable pointing at a directory of bundled tools
pub const TOOLS_DIR_ENV: &str = "FRAME_PIPELINE_TOOLS_DIR";

/// Tool path resolver for bundled and system-installed binaries
#[derive(Debug, Clone, Default)]
pub struct ToolPathResolver {
    /// Directory searched before `PATH`
    tools_dir: Option<PathBuf>,
    /// Explicit search path (None = the process `PATH`)
    search_path: Option<Vec<PathBuf>>,
}

impl ToolPathResolver {
    /// Create a resolver reading `FRAME_PIPELINE_TOOLS_DIR` and `PATH`
    pub fn new() -> Self {
        let tools_dir = env::var_os(TOOLS_DIR_ENV)
            .map(PathBuf::from)
            .filter(|dir| dir.is_dir());

        if let Some(ref dir) = tools_dir {
            debug!("Using tools directory from {}: {:?}", TOOLS_DIR_ENV, dir);
        }

        Self {
            tools_dir,
            search_path: None,
        }
    }

    /// Create a resolver that only looks in the given directories
    pub fn with_search_path(dirs: Vec<PathBuf>) -> Self {
        Self {
            tools_dir: None,
            search_path: Some(dirs),
        }
    }

    /// Resolve the path to a specific tool
    pub fn resolve_tool(&self, tool_name: &str) -> Option<PathBuf> {
        let file_name = executable_name(tool_name);

        if let Some(ref tools_dir) = self.tools_dir {
            let bundled = tools_dir.join(&file_name);
            if is_executable_file(&bundled) {
                debug!("Using bundled tool: {} -> {:?}", tool_name, bundled);
                return Some(bundled);
            }
        }

        let found = self.search_dirs().into_iter()
            .map(|dir| dir.join(&file_name))
            .find(|candidate| is_executable_file(candidate));

        match found {
            Some(ref path) => debug!("Using system tool: {} -> {:?}", tool_name, path),
            None => debug!("Tool not found: {}", tool_name),
        }
        found
    }

    /// Check if a specific tool is available
    pub fn is_tool_available(&self, tool_name: &str) -> bool {
        self.resolve_tool(tool_name).is_some()
    }

    /// Installation hint shown when a tool is missing
    pub fn install_hint(tool_name: &str) -> String {
        if cfg!(target_os = "linux") {
            match tool_name {
                "ffmpeg" | "ffprobe" => "install with: sudo apt-get install ffmpeg".to_string(),
                _ => format!("install with: sudo apt-get install {}", tool_name),
            }
        } else if cfg!(target_os = "macos") {
            match tool_name {
                "ffmpeg" | "ffprobe" => "install with: brew install ffmpeg".to_string(),
                _ => format!("install with: brew install {}", tool_name),
            }
        } else {
            format!(
                "ensure {} is on PATH or set {}",
                tool_name, TOOLS_DIR_ENV
            )
        }
    }

    fn search_dirs(&self) -> Vec<PathBuf> {
        match &self.search_path {
            Some(dirs) => dirs.clone(),
            None => env::var_os("PATH")
                .map(|path| env::split_paths(&path).collect())
                .unwrap_or_default(),
        }
    }
}

fn executable_name(tool_name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", tool_name)
    } else {
        tool_name.to_string()
    }
}

fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}
