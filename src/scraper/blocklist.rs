//! Ad and tracker domain blocklist
//!
//! A static set of root domains matched case-insensitively. A host matches
//! when the host itself or any parent suffix (split on `.`) is in the set,
//! so `sub.stats.doubleclick.net` matches the `doubleclick.net` entry.

use std::collections::HashSet;
use std::sync::OnceLock;

/// Root domains of common ad exchanges, trackers, and analytics beacons.
const AD_DOMAINS: &[&str] = &[
    "doubleclick.net",
    "googleadservices.com",
    "googlesyndication.com",
    "googletagmanager.com",
    "googletagservices.com",
    "google-analytics.com",
    "adservice.google.com",
    "adnxs.com",
    "adsrvr.org",
    "adsafeprotected.com",
    "adroll.com",
    "advertising.com",
    "amazon-adsystem.com",
    "ads.yahoo.com",
    "analytics.yahoo.com",
    "bidswitch.net",
    "bluekai.com",
    "casalemedia.com",
    "chartbeat.com",
    "criteo.com",
    "criteo.net",
    "crwdcntrl.net",
    "demdex.net",
    "dotmetrics.net",
    "doubleverify.com",
    "exelator.com",
    "facebook.net",
    "fbcdn.net",
    "flashtalking.com",
    "fwmrm.net",
    "hotjar.com",
    "impactradius.com",
    "indexww.com",
    "innovid.com",
    "kissmetrics.com",
    "krxd.net",
    "liadm.com",
    "lijit.com",
    "mathtag.com",
    "media.net",
    "mixpanel.com",
    "moatads.com",
    "mookie1.com",
    "newrelic.com",
    "nr-data.net",
    "omtrdc.net",
    "openx.net",
    "outbrain.com",
    "pardot.com",
    "pubmatic.com",
    "quantserve.com",
    "rlcdn.com",
    "rubiconproject.com",
    "scorecardresearch.com",
    "segment.io",
    "sharethrough.com",
    "smartadserver.com",
    "spotxchange.com",
    "taboola.com",
    "tapad.com",
    "teads.tv",
    "tremorhub.com",
    "turn.com",
    "yieldmo.com",
    "zedo.com",
];

fn domain_set() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| AD_DOMAINS.iter().copied().collect())
}

/// True if `host` or any of its parent domains is a known ad/tracker root.
pub fn is_ad_host(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let set = domain_set();

    let mut suffix = host.as_str();
    loop {
        if set.contains(suffix) {
            return true;
        }
        match suffix.split_once('.') {
            Some((_, parent)) => suffix = parent,
            None => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(is_ad_host("doubleclick.net"));
        assert!(is_ad_host("taboola.com"));
    }

    #[test]
    fn test_parent_suffix_match() {
        assert!(is_ad_host("stats.g.doubleclick.net"));
        assert!(is_ad_host("cdn.taboola.com"));
        assert!(is_ad_host("x.y.z.pubmatic.com"));
    }

    #[test]
    fn test_case_insensitive() {
        assert!(is_ad_host("Stats.DoubleClick.NET"));
    }

    #[test]
    fn test_non_ad_hosts_pass() {
        assert!(!is_ad_host("example.com"));
        assert!(!is_ad_host("news.ycombinator.com"));
        // Suffix must align on a dot boundary.
        assert!(!is_ad_host("notdoubleclick.net"));
    }
}
