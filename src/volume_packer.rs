//! Packs as many items as possible into a single box.
//!
//! The box is tried as given and turned a quarter around its vertical axis.
//! Each trial stacks layers from the bottom up. Every layer is packed twice
//! when needed: a preliminary pass discovers how deep the layer turns out,
//! then the layer is redone with that depth as a guideline so that early
//! items can already stack up to the full height.

use std::sync::Arc;

use crate::context::PackingContext;
use crate::error::Result;
use crate::events::PackEvent;
use crate::item_list::ItemList;
use crate::layer_packer::LayerPacker;
use crate::layer_stabiliser;
use crate::model::BoxType;
use crate::packed::{PackedBox, PackedItem, PackedItemList, PackedLayer};

pub(crate) struct VolumePacker<'a> {
    container: Arc<BoxType>,
    items: ItemList,
    ctx: PackingContext<'a>,
    single_pass: bool,
}

impl<'a> VolumePacker<'a> {
    pub fn new(container: Arc<BoxType>, items: ItemList, ctx: PackingContext<'a>) -> Self {
        Self {
            container,
            items,
            ctx,
            single_pass: false,
        }
    }

    /// Single-pass mode: no turned trial, no stabilisation, no deep lookahead.
    pub fn single_pass(mut self, single_pass: bool) -> Self {
        self.single_pass = single_pass;
        self
    }

    /// Packs the box. Only a timeout is an error; an empty result is a valid
    /// answer meaning nothing fits.
    pub fn pack(&self) -> Result<PackedBox> {
        let inner = self.container.inner();
        let try_turned = !self.single_pass && inner.width != inner.length;

        let mut best = self.pack_rotation(false)?;
        if try_turned && best.item_count() < self.items.len() {
            let turned = self.pack_rotation(true)?;
            if turned.item_count() == self.items.len()
                || turned.volume_utilisation() > best.volume_utilisation()
            {
                best = turned;
            }
        }

        log::debug!(
            "{}: {} of {} items, {:.1}% utilised",
            self.container,
            best.item_count(),
            self.items.len(),
            best.volume_utilisation()
        );
        self.ctx
            .emit(|| PackEvent::box_evaluated(&best, self.items.len()));
        Ok(best)
    }

    fn pack_rotation(&self, turned: bool) -> Result<PackedBox> {
        let turned_box;
        let container: &BoxType = if turned {
            turned_box = self.container.with_swapped_footprint();
            &turned_box
        } else {
            &self.container
        };

        let layer_packer = LayerPacker::new(container, self.ctx, self.single_pass).with_swapped_frame(turned);
        let preliminary_packer =
            LayerPacker::new(container, self.ctx.quiet(), self.single_pass).with_swapped_frame(turned);

        let mut items = self.items.clone();
        let mut packed = PackedItemList::new();
        let mut layers: Vec<PackedLayer> = Vec::new();
        let mut start_z = 0;

        while !items.is_empty() {
            self.ctx.check_deadline()?;

            let mut preliminary_items = items.clone();
            let mut preliminary_packed = packed.clone();
            let preliminary =
                preliminary_packer.pack_layer(&mut preliminary_items, &mut preliminary_packed, start_z, 0);
            if preliminary.is_empty() {
                break;
            }

            let depth = preliminary.depth();
            let first_depth = preliminary.items().first().map(PackedItem::depth);
            let layer = if first_depth == Some(depth) {
                items = preliminary_items;
                packed = preliminary_packed;
                preliminary
            } else {
                let mut redo_items = items.clone();
                let mut redo_packed = packed.clone();
                let redo = layer_packer.pack_layer(&mut redo_items, &mut redo_packed, start_z, depth);
                if redo.is_empty() {
                    items = preliminary_items;
                    packed = preliminary_packed;
                    preliminary
                } else {
                    items = redo_items;
                    packed = redo_packed;
                    redo
                }
            };

            self.ctx.emit(|| PackEvent::LayerFinalized {
                reference: self.container.reference().to_string(),
                start_depth: layer.start_depth(),
                depth: layer.depth(),
                items: layer.len(),
            });
            start_z += layer.depth();
            layers.push(layer);
        }

        let stabilise = !self.single_pass && !self.items.has_position_constraints();
        let layers = if stabilise {
            layer_stabiliser::stabilise(layers)
        } else {
            layers
        };

        let placed: PackedItemList = layers
            .into_iter()
            .flat_map(PackedLayer::into_items)
            .map(|p| if turned { p.with_swapped_axes() } else { p })
            .collect();
        Ok(PackedBox::new(Arc::clone(&self.container), placed))
    }
}
