/// Which pools to enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolFilter {
    #[default]
    All,
    Active,
    Inactive,
}

impl PoolFilter {
    pub fn matches(&self, active: bool) -> bool {
        match self {
            PoolFilter::All => true,
            PoolFilter::Active => active,
            PoolFilter::Inactive => !active,
        }
    }
}

/// Byte counters reported for a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolInfo {
    pub capacity: u64,
    pub allocation: u64,
    pub available: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VolumeCreateFlags(u32);

impl VolumeCreateFlags {
    pub const NONE: Self = Self(0);
    /// Preallocate image metadata only (qcow2 headers), not the data.
    pub const PREALLOC_METADATA: Self = Self(1 << 0);

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeHandle {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainHandle {
    pub name: String,
    pub uuid: String,
}
