//! Declarative customization actions
//!
//! The closed set of action kinds a configuration can declare. The set is
//! fixed by design: the dispatcher matches exhaustively over it, so adding
//! a kind is a compile-visible change everywhere it matters.

use std::path::PathBuf;

use serde::Deserialize;

/// One declarative unit of chroot customization.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Action {
    /// Install packages with the chroot's package manager.
    InstallPackages {
        /// Package names, installed in declaration order
        packages: Vec<String>,
        /// Packages to `apt-mark hold` after installation
        #[serde(default)]
        hold: Vec<String>,
    },

    /// Replace the installed kernel with the requested package.
    ReplaceKernel {
        /// Kernel package name, or a `.deb` path inside the chroot
        package: String,
        /// Narrows which installed kernel packages count as replaceable
        #[serde(default)]
        flavor: Option<String>,
    },

    /// Create a file inside the chroot.
    CreateFile {
        /// Destination path, interpreted inside the chroot
        destination: String,
        /// Inline file content
        #[serde(default)]
        content: Option<String>,
        /// External content source, copied in (relative to the config file)
        #[serde(default)]
        source: Option<PathBuf>,
        /// Octal file mode, e.g. "0644"
        #[serde(default)]
        mode: Option<String>,
        /// Numeric owner uid
        #[serde(default)]
        owner: Option<u32>,
        /// Numeric owner gid
        #[serde(default)]
        group: Option<u32>,
    },

    /// Run a shell script body inside the chroot.
    RunCommand {
        /// Script body, executed with the chroot as root
        command: String,
    },
}

impl Action {
    /// The configuration tag of this action kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::InstallPackages { .. } => "install_packages",
            Action::ReplaceKernel { .. } => "replace_kernel",
            Action::CreateFile { .. } => "create_file",
            Action::RunCommand { .. } => "run_command",
        }
    }

    /// A short identity string for logs and run reports.
    pub fn identity(&self) -> String {
        match self {
            Action::InstallPackages { packages, .. } => {
                format!("install_packages[{}]", packages.join(","))
            }
            Action::ReplaceKernel { package, .. } => format!("replace_kernel[{package}]"),
            Action::CreateFile { destination, .. } => format!("create_file[{destination}]"),
            Action::RunCommand { command } => {
                let mut summary: String = command.trim().chars().take(40).collect();
                if command.trim().chars().count() > 40 {
                    summary.push('…');
                }
                format!("run_command[{summary}]")
            }
        }
    }

    /// Whether applying this action uses the chroot's package manager.
    pub fn needs_package_manager(&self) -> bool {
        matches!(
            self,
            Action::InstallPackages { .. } | Action::ReplaceKernel { .. }
        )
    }

    /// Structural validation, run for the whole list before dispatch.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Action::InstallPackages { packages, hold } => {
                if packages.is_empty() {
                    return Err("package list must not be empty".to_string());
                }
                if packages.iter().any(|p| p.trim().is_empty()) {
                    return Err("package names must not be empty".to_string());
                }
                if let Some(unknown) = hold.iter().find(|h| !packages.contains(h)) {
                    return Err(format!(
                        "held package '{unknown}' is not in the package list"
                    ));
                }
                Ok(())
            }
            Action::ReplaceKernel { package, .. } => {
                if package.trim().is_empty() {
                    return Err("kernel package must not be empty".to_string());
                }
                Ok(())
            }
            Action::CreateFile {
                destination,
                content,
                source,
                mode,
                ..
            } => {
                if destination.trim().is_empty() {
                    return Err("destination must not be empty".to_string());
                }
                if lexically_escapes(destination) {
                    return Err(format!("destination '{destination}' escapes the chroot root"));
                }
                match (content, source) {
                    (Some(_), Some(_)) => {
                        return Err("content and source are mutually exclusive".to_string())
                    }
                    (None, None) => {
                        return Err("one of content or source is required".to_string())
                    }
                    _ => {}
                }
                if let Some(mode) = mode {
                    parse_mode(mode)?;
                }
                Ok(())
            }
            Action::RunCommand { command } => {
                if command.trim().is_empty() {
                    return Err("command must not be empty".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Parse an octal mode string such as "0644".
pub fn parse_mode(mode: &str) -> Result<u32, String> {
    u32::from_str_radix(mode.trim_start_matches("0o"), 8)
        .map_err(|_| format!("invalid octal mode '{mode}'"))
        .and_then(|m| {
            if m > 0o7777 {
                Err(format!("mode '{mode}' is out of range"))
            } else {
                Ok(m)
            }
        })
}

/// True when a destination path walks above the chroot root by lexical
/// normalization alone.
pub fn lexically_escapes(destination: &str) -> bool {
    let mut depth: i64 = 0;
    for component in std::path::Path::new(destination).components() {
        match component {
            std::path::Component::Normal(_) => depth += 1,
            std::path::Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}
