use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::error::ProbeError;

/// Architectures the daemon knows about, with their stable numeric ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    I686 = 1,
    X86_64 = 2,
    Armv7l = 3,
    Aarch64 = 4,
    Ppc = 5,
    Ppc64 = 6,
    Ppc64le = 7,
    S390x = 8,
    Mips = 9,
    Mips64 = 10,
    Riscv32 = 11,
    Riscv64 = 12,
}

const ALL: [Architecture; 12] = [
    Architecture::I686,
    Architecture::X86_64,
    Architecture::Armv7l,
    Architecture::Aarch64,
    Architecture::Ppc,
    Architecture::Ppc64,
    Architecture::Ppc64le,
    Architecture::S390x,
    Architecture::Mips,
    Architecture::Mips64,
    Architecture::Riscv32,
    Architecture::Riscv64,
];

impl Architecture {
    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::I686 => "i686",
            Self::X86_64 => "x86_64",
            Self::Armv7l => "armv7l",
            Self::Aarch64 => "aarch64",
            Self::Ppc => "ppc",
            Self::Ppc64 => "ppc64",
            Self::Ppc64le => "ppc64le",
            Self::S390x => "s390x",
            Self::Mips => "mips",
            Self::Mips64 => "mips64",
            Self::Riscv32 => "riscv32",
            Self::Riscv64 => "riscv64",
        }
    }

    /// Alternative spellings used by distributions and kernels.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::I686 => &["i386", "i586", "386", "x86", "generic_32"],
            Self::X86_64 => &["amd64", "generic_64"],
            Self::Armv7l => &[
                "armel", "armhf", "arm", "armhfp", "armv7a", "armv7hl", "armv7hnl", "armv7nhl",
                "armv8l",
            ],
            Self::Aarch64 => &["arm64", "arm64_generic"],
            Self::Ppc => &["powerpc"],
            Self::Ppc64 => &["powerpc64"],
            Self::Ppc64le => &["ppc64el"],
            Self::S390x => &[],
            Self::Mips => &["mipsel", "mipsle"],
            Self::Mips64 => &["mips64el", "mips64le"],
            Self::Riscv32 => &[],
            Self::Riscv64 => &[],
        }
    }

    /// Compatible execution personalities of this architecture.
    pub fn personalities(self) -> &'static [Architecture] {
        match self {
            Self::X86_64 => &[Self::I686],
            Self::Aarch64 => &[Self::Armv7l],
            Self::Ppc64 => &[Self::Ppc],
            _ => &[],
        }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        ALL.into_iter().find(|arch| arch.id() == id)
    }
}

impl FromStr for Architecture {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL.into_iter()
            .find(|arch| arch.name() == s || arch.aliases().contains(&s))
            .ok_or_else(|| ProbeError::UnknownArchitecture {
                name: s.to_string(),
            })
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Architecture {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Supported architectures for a host whose `uname -m` is `machine`:
/// the primary architecture first, then its personalities.
pub fn architectures_for(machine: &str) -> Result<Vec<Architecture>, ProbeError> {
    let primary: Architecture = machine.parse()?;
    let mut architectures = vec![primary];
    architectures.extend_from_slice(primary.personalities());
    Ok(architectures)
}

/// Machine name of the running kernel.
pub fn local_machine() -> Result<String, ProbeError> {
    let uts = nix::sys::utsname::uname()?;
    Ok(uts.machine().to_string_lossy().into_owned())
}

/// Supported architectures of this host. Fails only if the primary one is unknown.
pub fn get_architectures() -> Result<Vec<Architecture>, ProbeError> {
    let machine = local_machine()?;
    let architectures = architectures_for(&machine)?;
    debug!("Host architectures: {:?}", architectures);
    Ok(architectures)
}
