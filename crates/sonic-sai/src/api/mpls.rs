//! MPLS label switching entries.

use crate::error::SaiResult;
use crate::types::NextHopOid;
use sonic_types::MplsLabel;

/// Swap `in_label` for `out_label` and send to `next_hop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelSwitchEntry {
    pub in_label: MplsLabel,
    pub out_label: MplsLabel,
    pub next_hop: NextHopOid,
    pub ttl: u8,
}

pub trait MplsApi: Send + Sync {
    /// `AlreadyExists` if `entry.in_label` is bound.
    fn create_label_entry(&self, entry: &LabelSwitchEntry) -> SaiResult<()>;

    fn remove_label_entry(&self, in_label: MplsLabel) -> SaiResult<()>;

    fn get_label_entry(&self, in_label: MplsLabel) -> SaiResult<LabelSwitchEntry>;
}
