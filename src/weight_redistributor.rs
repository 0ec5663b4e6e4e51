//! Evens out box weights after the main pack.
//!
//! Pairs of boxes with different weights are examined heaviest first. Items
//! move from the heavier box to the lighter one when the move brings the pair
//! closer together and the lighter box stays at or below the mean. Every move
//! is checked by repacking both boxes; a move that would need an extra box is
//! rejected. The box count never goes up.

use std::sync::Arc;

use crate::context::PackingContext;
use crate::error::{PackingError, Result};
use crate::events::PackEvent;
use crate::item_list::ItemList;
use crate::model::Item;
use crate::packed::{PackedBox, PackedBoxList};
use crate::packer::{BoxQuantities, PackingEngine};
use crate::types::Weighted;

enum Equalised {
    Unchanged,
    /// The heavier box was emptied into the lighter one.
    Merged(PackedBox),
    Rebalanced { over: PackedBox, under: PackedBox },
}

pub(crate) struct WeightRedistributor<'a> {
    /// Used for trial repacks; never observed.
    engine: PackingEngine<'a>,
    ctx: PackingContext<'a>,
    quantities: BoxQuantities,
}

impl<'a> WeightRedistributor<'a> {
    pub fn new(engine: PackingEngine<'a>, quantities: BoxQuantities) -> Self {
        Self {
            ctx: engine.ctx,
            engine: PackingEngine {
                ctx: engine.ctx.unobserved(),
                ..engine
            },
            quantities,
        }
    }

    pub fn redistribute(mut self, original: PackedBoxList) -> Result<PackedBoxList> {
        let target = original.mean_item_weight();
        let mut boxes: Vec<PackedBox> = original.as_slice().to_vec();
        sort_heaviest_first(&mut boxes);

        log::debug!("redistributing {} boxes towards {target:.1} per box", boxes.len());

        while self.rebalance_one_pair(&mut boxes, target)? {
            sort_heaviest_first(&mut boxes);
        }

        if boxes.len() > original.len() {
            return Ok(original);
        }

        let mut result = PackedBoxList::new(Arc::clone(original.sorter()));
        for packed_box in boxes {
            result.insert(packed_box);
        }
        Ok(result)
    }

    /// Finds the first pair that can be improved and applies the change.
    fn rebalance_one_pair(&mut self, boxes: &mut Vec<PackedBox>, target: f64) -> Result<bool> {
        for a in 0..boxes.len() {
            for b in (a + 1)..boxes.len() {
                if boxes[a].weight() == boxes[b].weight() {
                    continue;
                }
                let (over, under) = if boxes[a].weight() > boxes[b].weight() {
                    (a, b)
                } else {
                    (b, a)
                };

                match self.equalise(&boxes[over], &boxes[under], target)? {
                    Equalised::Unchanged => {}
                    Equalised::Merged(merged) => {
                        boxes[under] = merged;
                        boxes.remove(over);
                        return Ok(true);
                    }
                    Equalised::Rebalanced {
                        over: new_over,
                        under: new_under,
                    } => {
                        boxes[over] = new_over;
                        boxes[under] = new_under;
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    fn equalise(&mut self, over: &PackedBox, under: &PackedBox, target: f64) -> Result<Equalised> {
        let mut over_items: Vec<Arc<Item>> = over.items().source_items().cloned().collect();
        let mut under_items: Vec<Arc<Item>> = under.items().source_items().cloned().collect();
        let mut current_over = over.clone();
        let mut current_under = under.clone();
        let mut changed = false;

        let mut index = 0;
        while index < over_items.len() {
            let candidate = Arc::clone(&over_items[index]);
            if !would_help(&over_items, &candidate, &under_items, target) {
                index += 1;
                continue;
            }

            // Both boxes of the pair go back to stock; the repacks draw from it in turn.
            let stock = self.stock_without(&current_over, &current_under);

            let mut new_under_items = under_items.clone();
            new_under_items.push(Arc::clone(&candidate));
            let Some((new_under, stock)) = self.repack(new_under_items.clone(), &stock)? else {
                self.report(&current_over, &current_under, &candidate, false);
                index += 1;
                continue;
            };

            if over_items.len() == 1 {
                self.report(&current_over, &current_under, &candidate, true);
                self.quantities = stock;
                return Ok(Equalised::Merged(new_under));
            }

            let mut new_over_items = over_items.clone();
            new_over_items.remove(index);
            let Some((new_over, stock)) = self.repack(new_over_items.clone(), &stock)? else {
                self.report(&current_over, &current_under, &candidate, false);
                index += 1;
                continue;
            };

            self.report(&current_over, &current_under, &candidate, true);
            self.quantities = stock;

            over_items = new_over_items;
            under_items = new_under_items;
            current_over = new_over;
            current_under = new_under;
            changed = true;
            // The next candidate has moved into `index`.
        }

        Ok(if changed {
            Equalised::Rebalanced {
                over: current_over,
                under: current_under,
            }
        } else {
            Equalised::Unchanged
        })
    }

    /// Current stock with the pair's boxes returned.
    fn stock_without(&self, over: &PackedBox, under: &PackedBox) -> BoxQuantities {
        let mut stock = self.quantities.clone();
        for container in [over.container(), under.container()] {
            if let Some(index) = self.engine.index_of(container) {
                stock.release(index);
            }
        }
        stock
    }

    /// Packs `items` into exactly one box drawn from `stock`. Returns the box
    /// and the stock left after it was taken.
    fn repack(&self, items: Vec<Arc<Item>>, stock: &BoxQuantities) -> Result<Option<(PackedBox, BoxQuantities)>> {
        let mut quantities = stock.clone();
        let items = ItemList::sorted(items, self.engine.item_sorter);
        match self
            .engine
            .do_volume_packing(items, &mut quantities, true, true)
        {
            Ok(packed) if packed.len() == 1 => Ok(packed.into_vec().pop().map(|b| (b, quantities))),
            Ok(_) => Ok(None),
            Err(err @ PackingError::Timeout { .. }) => Err(err),
            Err(_) => Ok(None),
        }
    }

    fn report(&self, from: &PackedBox, to: &PackedBox, item: &Item, accepted: bool) {
        log::trace!(
            "moving {} from {} to {}: {}",
            item.description(),
            from.container(),
            to.container(),
            if accepted { "accepted" } else { "rejected" }
        );
        self.ctx.emit(|| PackEvent::RedistributionAttempted {
            from: from.container().reference().to_string(),
            to: to.container().reference().to_string(),
            description: item.description().to_string(),
            accepted,
        });
    }
}

fn sort_heaviest_first(boxes: &mut [PackedBox]) {
    boxes.sort_by(|a, b| b.weight().cmp(&a.weight()));
}

fn items_weight(items: &[Arc<Item>]) -> u64 {
    items.iter().map(|item| u64::from(item.weight())).sum()
}

/// Squared distance of one box from the pair's mean.
fn pair_variance(a: u64, b: u64) -> f64 {
    let mean = (a + b) as f64 / 2.0;
    (a as f64 - mean).powi(2)
}

/// Whether moving `candidate` from the heavier to the lighter box is worth a try.
fn would_help(over_items: &[Arc<Item>], candidate: &Item, under_items: &[Arc<Item>], target: f64) -> bool {
    let moved = u64::from(candidate.weight());
    let over = items_weight(over_items);
    let under = items_weight(under_items);

    if (under + moved) as f64 > target {
        return false;
    }
    pair_variance(over.saturating_sub(moved), under + moved) < pair_variance(over, under)
}
