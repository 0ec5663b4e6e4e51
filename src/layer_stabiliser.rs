//! Reorders a box's layers so broad, deep layers sit at the bottom.

use crate::packed::PackedLayer;

/// Sorts layers by footprint (largest first), then depth (deepest first), and
/// restacks them from z = 0. The sort is stable, so equal layers keep their
/// creation order.
pub(crate) fn stabilise(mut layers: Vec<PackedLayer>) -> Vec<PackedLayer> {
    layers.sort_by(|a, b| {
        b.footprint()
            .cmp(&a.footprint())
            .then_with(|| b.depth().cmp(&a.depth()))
    });

    let mut current_z = 0;
    let mut stabilised = Vec::with_capacity(layers.len());
    for layer in layers {
        let old_start = layer.start_depth();
        let depth = layer.depth();
        let mut restacked = PackedLayer::new();
        for item in layer.into_items() {
            let z = item.z() - old_start + current_z;
            restacked.insert(item.with_z(z));
        }
        stabilised.push(restacked);
        current_z += depth;
    }
    stabilised
}
