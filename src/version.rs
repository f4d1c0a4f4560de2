//! Version and build information

use std::fmt;

use crate::protocol::PING_FRAME;

/// Build information embedded at compile time
#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
    /// Short git commit hash
    pub git_hash: &'static str,
    git_dirty_str: &'static str,
    pub build_timestamp: &'static str,
    /// Target triple
    pub target: &'static str,
    /// debug or release
    pub profile: &'static str,
}

impl BuildInfo {
    pub const fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            git_hash: env!("ORRA_GIT_HASH"),
            git_dirty_str: env!("ORRA_GIT_DIRTY"),
            build_timestamp: env!("ORRA_BUILD_TIMESTAMP"),
            target: env!("ORRA_TARGET"),
            profile: env!("ORRA_PROFILE"),
        }
    }

    pub fn git_dirty(&self) -> bool {
        self.git_dirty_str == "true"
    }

    /// e.g. "0.1.0-abc1234" or "0.1.0-abc1234-dirty"
    pub fn full_version(&self) -> String {
        if self.git_dirty() {
            format!("{}-{}-dirty", self.version, self.git_hash)
        } else {
            format!("{}-{}", self.version, self.git_hash)
        }
    }

    pub fn short_version(&self) -> String {
        format!("{} ({})", self.version, self.git_hash)
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.name, self.full_version())?;
        writeln!(f)?;
        writeln!(f, "Build Information:")?;
        writeln!(f, "  Version:    {}", self.version)?;
        writeln!(f, "  Git Hash:   {}{}", self.git_hash, if self.git_dirty() { " (dirty)" } else { "" })?;
        writeln!(f, "  Built:      {}", self.build_timestamp)?;
        writeln!(f, "  Profile:    {}", self.profile)?;
        writeln!(f, "  Target:     {}", self.target)?;
        writeln!(f)?;
        writeln!(f, "Protocol:")?;
        writeln!(f, "  Heartbeat:  \"{}\" text frame, pong envelope reply", PING_FRAME)?;
        writeln!(f, "  Delivery:   ACK per envelope id")?;
        Ok(())
    }
}

pub fn build_info() -> BuildInfo {
    BuildInfo::current()
}

/// Print version information to stdout
pub fn print_version() {
    print!("{}", build_info());
}
