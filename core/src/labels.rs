//! Kill-type labeling.
//!
//! Mapping a cause or killer-role identifier to the descriptive label stored
//! on a player record is a pure table lookup: case-insensitive substring
//! match over a fixed vocabulary, with a generic fallback so the mapping is
//! total.

/// Label applied when no table entry matches.
pub const GENERIC_KILL_LABEL: &str = "Killed";

/// Label applied to ejections.
pub const EJECTED_LABEL: &str = "Ejected";

/// (needle, label) pairs scanned in order against the lowercased identifier.
const KILL_LABELS: &[(&str, &str)] = &[
    ("warlock", "Cursed"),
    ("bomber", "Bombed"),
    ("arsonist", "Ignited"),
    ("werewolf", "Mauled"),
    ("vampire", "Bitten"),
    ("sheriff", "Shot"),
    ("vigilante", "Shot"),
    ("hunter", "Hunted"),
    ("glitch", "Hacked"),
    ("juggernaut", "Slashed"),
    ("venerer", "Venerated"),
    ("puppeteer", "Controlled"),
    ("parasite", "Infected"),
    ("pestilence", "Infected"),
    ("plaguebearer", "Infected"),
    ("soulcollector", "Reaped"),
    ("soul collector", "Reaped"),
    ("assassin", "Guessed"),
    ("guess", "Guessed"),
    ("prosecut", "Prosecuted"),
    ("inquisitor", "Vanquished"),
    ("mercenary", "Executed"),
    ("chef", "Poisoned"),
    ("altruist", "Sacrificed"),
    ("oracle", "Confessed"),
    ("doomsayer", "Observed"),
];

/// Maps a kill cause or killer-role identifier to its descriptive label.
pub fn kill_label(identifier: &str) -> &'static str {
    let needle = identifier.to_lowercase();
    KILL_LABELS
        .iter()
        .find(|(fragment, _)| needle.contains(fragment))
        .map(|(_, label)| *label)
        .unwrap_or(GENERIC_KILL_LABEL)
}
