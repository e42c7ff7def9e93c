//! Capability descriptors for appliance families.
//!
//! A [`Variant`] lists what a chassis adds on top of the base ACQ400
//! discovery and orchestration: extra fixed-position service sites and extra
//! knob writes after clock or routing changes.

/// A service site at a fixed position, outside the `SITELIST` enumeration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtraSite {
    /// Dispatch name, e.g. `"cA"`.
    pub name: &'static str,
    /// Site number; the service listens on `SITE0 + site`.
    pub site: u8,
}

/// One knob write on site 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KnobStep {
    pub knob: &'static str,
    pub value: &'static str,
    /// Absence of the knob is logged and skipped instead of failing.
    pub optional: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Variant {
    pub name: &'static str,
    /// Lowest motherboard clock the PLL accepts, in Hz.
    pub mb_clk_min: u64,
    /// Best-effort sites connected after discovery.
    pub extra_sites: &'static [ExtraSite],
    /// MGT-DRAM offload site, connected when the device config asks for it.
    pub mgtdram_site: Option<ExtraSite>,
    /// Written after [`set_mb_clk`](crate::DeviceProxy::set_mb_clk).
    pub clock_steps: &'static [KnobStep],
    /// Written after [`set_sync_routing_slave`](crate::DeviceProxy::set_sync_routing_slave).
    pub slave_routing_steps: &'static [KnobStep],
    /// Whether the MGT-DRAM bulk transfer service exists.
    pub has_mgt: bool,
}

impl Variant {
    /// Single-board ACQ400 carrier.
    pub const ACQ400: Self = Self {
        name: "acq400",
        mb_clk_min: 4_000_000,
        extra_sites: &[],
        mgtdram_site: None,
        clock_steps: &[],
        slave_routing_steps: &[],
        has_mgt: false,
    };

    /// ACQ2106 multi-board chassis with clock distribution boards.
    pub const ACQ2106: Self = Self {
        name: "acq2106",
        mb_clk_min: 100_000,
        extra_sites: &[
            ExtraSite {
                name: "cA",
                site: 13,
            },
            ExtraSite {
                name: "cB",
                site: 12,
            },
        ],
        mgtdram_site: Some(ExtraSite {
            name: "s14",
            site: 14,
        }),
        clock_steps: &[
            KnobStep {
                knob: "SYS_CLK_DIST_CLK_SRC",
                value: "Si5326",
                optional: true,
            },
            KnobStep {
                knob: "SYS_CLK_OE_CLK1_ZYNQ",
                value: "1",
                optional: false,
            },
        ],
        slave_routing_steps: &[KnobStep {
            knob: "SYS_CLK_OE_CLK1_ZYNQ",
            value: "1",
            optional: false,
        }],
        has_mgt: true,
    };

    /// Pick the variant from a root `MODEL` reply.
    pub fn for_model(model: &str) -> Self {
        if model.trim().to_ascii_lowercase().starts_with("acq2106") {
            Self::ACQ2106
        } else {
            Self::ACQ400
        }
    }
}

impl Default for Variant {
    fn default() -> Self {
        Self::ACQ400
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_selects_variant() {
        assert_eq!(Variant::for_model("acq2106_123"), Variant::ACQ2106);
        assert_eq!(Variant::for_model("ACQ2106\n"), Variant::ACQ2106);
        assert_eq!(Variant::for_model("acq1001"), Variant::ACQ400);
    }

    #[test]
    fn chassis_adds_clock_boards() {
        let names: Vec<_> = Variant::ACQ2106.extra_sites.iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["cA", "cB"]);
        assert!(Variant::ACQ400.extra_sites.is_empty());
        assert!(Variant::ACQ2106.mb_clk_min < Variant::ACQ400.mb_clk_min);
    }
}
