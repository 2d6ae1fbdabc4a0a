use std::fmt;
use std::process::{Command, Stdio};

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: &'static str,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

fn probe(program: &str, args: &[&str]) -> bool {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check the tooling `BuildxBackend` shells out to.
/// Returns a list of missing items. Empty list means all prerequisites are met.
pub fn check_buildx_prereqs(program: &str) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    if !probe(program, &["--version"]) {
        missing.push(MissingPrereq {
            name: "docker",
            purpose: "running multi-stage builds",
            install_hint: "zypper install docker | apt install docker.io | dnf install docker | pacman -S docker",
        });
        return missing;
    }

    if !probe(program, &["buildx", "version"]) {
        missing.push(MissingPrereq {
            name: "docker buildx",
            purpose: "multi-platform builds and local exports",
            install_hint: "apt install docker-buildx | dnf install docker-buildx-plugin | pacman -S docker-buildx",
        });
    }

    missing
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nfnpack drives docker buildx to build layers and functions.");
    msg.push_str("\nSet FNPACK_SKIP_PREREQS=1 to bypass this check.");
    msg
}
