use vlab_core::Concentration;

/// Concentration of `dest` after `added_volume` of `added` is poured into it.
///
/// Volume-weighted average of the two liquids. An empty destination (no
/// concentration, or volume within `epsilon` of zero) simply takes the added
/// concentration. An unmeasured sample on either side makes the mixture
/// unmeasured too; two blanks stay a blank.
pub fn blend_concentration(
    dest_volume: f64,
    dest: Option<Concentration>,
    added_volume: f64,
    added: Concentration,
    epsilon: f64,
) -> Concentration {
    let dest = match dest {
        Some(dest) if dest_volume > epsilon => dest,
        _ => return added,
    };
    if added_volume <= epsilon {
        return dest;
    }
    match (dest, added) {
        (Concentration::Known(c1), Concentration::Known(c2)) => {
            let total = dest_volume + added_volume;
            Concentration::Known((dest_volume * c1 + added_volume * c2) / total)
        }
        _ => Concentration::Unknown,
    }
}
