use std::fmt;

use anyhow::{anyhow, Result};
use serde::Serialize;

/// Sentinel token meaning "leave this axis as it is".
pub const NO_CHANGE: &str = "NA";

pub const WIDEST_BANDWIDTH_MHZ: u32 = 160;
/// Station radios need two chains per stream at the widest bandwidth.
pub const MAX_STREAMS_AT_WIDEST: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Setting {
    Unchanged,
    Value(u32),
}

impl Setting {
    pub fn parse(token: &str) -> Result<Self> {
        if token == NO_CHANGE {
            return Ok(Self::Unchanged);
        }
        token
            .parse::<u32>()
            .map(Self::Value)
            .map_err(|_| anyhow!("`{token}` is neither a number nor {NO_CHANGE}"))
    }

    pub fn value(self) -> Option<u32> {
        match self {
            Self::Unchanged => None,
            Self::Value(value) => Some(value),
        }
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unchanged => f.write_str(NO_CHANGE),
            Self::Value(value) => write!(f, "{value}"),
        }
    }
}

/// Splits a space-separated axis list. `axis` names the flag in error messages.
pub fn parse_axis(axis: &str, raw: Option<&str>) -> Result<Vec<Setting>> {
    let raw = raw.ok_or_else(|| anyhow!("Must specify {axis}"))?;
    let settings = raw
        .split_whitespace()
        .map(|token| Setting::parse(token).map_err(|err| anyhow!("invalid {axis}: {err}")))
        .collect::<Result<Vec<_>>>()?;
    if settings.is_empty() {
        return Err(anyhow!("Must specify {axis}"));
    }
    Ok(settings)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SweepPoint {
    pub channel: Setting,
    pub nss: Setting,
    pub bandwidth: Setting,
    pub txpower: Setting,
}

impl SweepPoint {
    /// Key of the station radio configuration shared by all txpower points of a combination.
    pub fn radio_key(&self) -> (Setting, Setting, Setting) {
        (self.channel, self.nss, self.bandwidth)
    }
}

impl fmt::Display for SweepPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Channel {} NSS {} BW {} TX-Power {}",
            self.channel, self.nss, self.bandwidth, self.txpower
        )
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SweepPlan {
    channels: Vec<Setting>,
    nss: Vec<Setting>,
    bandwidths: Vec<Setting>,
    txpowers: Vec<Setting>,
}

impl SweepPlan {
    pub fn new(
        channels: Vec<Setting>,
        nss: Vec<Setting>,
        bandwidths: Vec<Setting>,
        txpowers: Vec<Setting>,
    ) -> Result<Self> {
        for (axis, values) in [
            ("channels", &channels),
            ("NSS", &nss),
            ("bandwidths", &bandwidths),
            ("txpower", &txpowers),
        ] {
            if values.is_empty() {
                return Err(anyhow!("Must specify {axis}"));
            }
        }
        Ok(Self {
            channels,
            nss,
            bandwidths,
            txpowers,
        })
    }

    pub fn len(&self) -> usize {
        self.channels.len() * self.nss.len() * self.bandwidths.len() * self.txpowers.len()
    }

    /// Channel, then NSS, then bandwidth, then txpower, outermost first.
    pub fn points(&self) -> impl Iterator<Item = SweepPoint> + '_ {
        self.channels.iter().flat_map(move |&channel| {
            self.nss.iter().flat_map(move |&nss| {
                self.bandwidths.iter().flat_map(move |&bandwidth| {
                    self.txpowers.iter().map(move |&txpower| SweepPoint {
                        channel,
                        nss,
                        bandwidth,
                        txpower,
                    })
                })
            })
        })
    }
}

/// Station radio antenna set, as understood by the radio configuration command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ChainMask {
    A,
    Ab,
    Abc,
    All,
}

impl ChainMask {
    pub fn for_streams(streams: u32) -> Self {
        match streams {
            1 => Self::A,
            2 => Self::Ab,
            3 => Self::Abc,
            _ => Self::All,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::A => "1",
            Self::Ab => "4",
            Self::Abc => "7",
            Self::All => "0",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RadioPlan {
    /// NSS axis is `NA`: the station radio is left alone.
    Unchanged,
    Configure { chains: u32, mask: ChainMask },
    /// Not achievable on the station hardware; the whole combination is skipped.
    Unsupported { requested: u32 },
}

pub fn radio_plan(nss: Setting, bandwidth: Setting) -> RadioPlan {
    let Some(requested) = nss.value() else {
        return RadioPlan::Unchanged;
    };
    let mut chains = requested;
    if bandwidth == Setting::Value(WIDEST_BANDWIDTH_MHZ) {
        if requested > MAX_STREAMS_AT_WIDEST {
            return RadioPlan::Unsupported { requested };
        }
        chains *= 2;
    }
    RadioPlan::Configure {
        chains,
        mask: ChainMask::for_streams(chains),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(raw: &str) -> Vec<Setting> {
        parse_axis("test", Some(raw)).expect("valid axis")
    }

    #[test]
    fn chain_mask_table_matches_radio_codes() {
        assert_eq!(ChainMask::for_streams(1).code(), "1");
        assert_eq!(ChainMask::for_streams(2).code(), "4");
        assert_eq!(ChainMask::for_streams(3).code(), "7");
        assert_eq!(ChainMask::for_streams(4), ChainMask::All);
        assert_eq!(ChainMask::for_streams(8), ChainMask::All);
        assert_eq!(ChainMask::for_streams(0), ChainMask::All);
    }

    #[test]
    fn widest_bandwidth_doubles_small_stream_counts() {
        let bw160 = Setting::Value(160);
        assert_eq!(
            radio_plan(Setting::Value(1), bw160),
            RadioPlan::Configure {
                chains: 2,
                mask: ChainMask::Ab
            }
        );
        assert_eq!(
            radio_plan(Setting::Value(2), bw160),
            RadioPlan::Configure {
                chains: 4,
                mask: ChainMask::All
            }
        );
        assert_eq!(
            radio_plan(Setting::Value(3), bw160),
            RadioPlan::Unsupported { requested: 3 }
        );
        assert_eq!(
            radio_plan(Setting::Value(4), bw160),
            RadioPlan::Unsupported { requested: 4 }
        );
    }

    #[test]
    fn narrower_bandwidths_use_requested_streams() {
        for bw in [Setting::Value(20), Setting::Value(80), Setting::Unchanged] {
            assert_eq!(
                radio_plan(Setting::Value(3), bw),
                RadioPlan::Configure {
                    chains: 3,
                    mask: ChainMask::Abc
                }
            );
        }
        assert_eq!(
            radio_plan(Setting::Unchanged, Setting::Value(160)),
            RadioPlan::Unchanged
        );
    }

    #[test]
    fn points_nest_channel_nss_bandwidth_txpower() -> Result<()> {
        let plan = SweepPlan::new(
            settings("36 100"),
            settings("1 2"),
            settings("20"),
            settings("1 NA"),
        )?;
        let points: Vec<String> = plan.points().map(|p| p.to_string()).collect();
        assert_eq!(plan.len(), 8);
        assert_eq!(
            points,
            vec![
                "Channel 36 NSS 1 BW 20 TX-Power 1",
                "Channel 36 NSS 1 BW 20 TX-Power NA",
                "Channel 36 NSS 2 BW 20 TX-Power 1",
                "Channel 36 NSS 2 BW 20 TX-Power NA",
                "Channel 100 NSS 1 BW 20 TX-Power 1",
                "Channel 100 NSS 1 BW 20 TX-Power NA",
                "Channel 100 NSS 2 BW 20 TX-Power 1",
                "Channel 100 NSS 2 BW 20 TX-Power NA",
            ]
        );
        // Restartable: a second pass yields the same sequence.
        assert_eq!(plan.points().count(), 8);
        Ok(())
    }

    #[test]
    fn empty_or_garbage_axes_are_configuration_errors() {
        let err = parse_axis("bandwidths", Some("   ")).expect_err("empty list");
        assert!(err.to_string().contains("Must specify bandwidths"));
        let err = parse_axis("channels", None).expect_err("missing list");
        assert!(err.to_string().contains("Must specify channels"));
        let err = parse_axis("NSS", Some("1 two")).expect_err("bad token");
        assert!(err.to_string().contains("`two`"));
        assert!(SweepPlan::new(vec![], settings("1"), settings("20"), settings("1")).is_err());
    }

    #[test]
    fn sentinel_round_trips_through_display() {
        assert_eq!(Setting::parse("NA").expect("sentinel").to_string(), "NA");
        assert_eq!(Setting::parse("36").expect("number").to_string(), "36");
    }
}
