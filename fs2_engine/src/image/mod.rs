//! Image layers: five classes of ten slots each, ticked once per frame.

mod slot;

use serde::{Deserialize, Serialize};

use crate::cache::AssetCache;
use crate::codec::DecodedImage;
use crate::config::{FW_OFFSET, SLOT_CAPACITY};
use crate::error::{EngineError, EngineResult};
use crate::render::DrawCommand;

pub use slot::{ImageSlot, Part, SlotKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageClass {
    Bg,
    Eg,
    Fg,
    Cg,
    Fw,
}

impl ImageClass {
    pub const ALL: [ImageClass; 5] = [
        ImageClass::Bg,
        ImageClass::Eg,
        ImageClass::Fg,
        ImageClass::Cg,
        ImageClass::Fw,
    ];

    /// Back to front.
    pub const RENDER_ORDER: [ImageClass; 5] = [
        ImageClass::Bg,
        ImageClass::Cg,
        ImageClass::Eg,
        ImageClass::Fg,
        ImageClass::Fw,
    ];

    pub fn from_key(key: &str) -> Option<Self> {
        ImageClass::ALL
            .into_iter()
            .find(|class| class.key() == key)
    }

    pub fn key(self) -> &'static str {
        match self {
            ImageClass::Bg => "bg",
            ImageClass::Eg => "eg",
            ImageClass::Fg => "fg",
            ImageClass::Cg => "cg",
            ImageClass::Fw => "fw",
        }
    }

    pub fn is_composite(self) -> bool {
        matches!(self, ImageClass::Cg | ImageClass::Fw)
    }

    pub fn slot_kind(self) -> SlotKind {
        match self {
            ImageClass::Cg => SlotKind::Composite { offset: (0, 0) },
            ImageClass::Fw => SlotKind::Composite { offset: FW_OFFSET },
            _ => SlotKind::Plain,
        }
    }

    fn index(self) -> usize {
        match self {
            ImageClass::Bg => 0,
            ImageClass::Eg => 1,
            ImageClass::Fg => 2,
            ImageClass::Cg => 3,
            ImageClass::Fw => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageLayers {
    layers: Vec<Vec<ImageSlot>>,
    transition_frames: u32,
}

impl ImageLayers {
    pub fn new(transition_frames: u32) -> Self {
        let layers = ImageClass::ALL
            .iter()
            .map(|class| vec![ImageSlot::new(class.slot_kind()); SLOT_CAPACITY])
            .collect();
        ImageLayers {
            layers,
            transition_frames,
        }
    }

    pub fn slot(&self, class: ImageClass, index: usize) -> EngineResult<&ImageSlot> {
        self.layers[class.index()]
            .get(index)
            .ok_or_else(|| EngineError::index(class.key(), index, SLOT_CAPACITY))
    }

    fn slot_mut(&mut self, class: ImageClass, index: usize) -> EngineResult<&mut ImageSlot> {
        self.layers[class.index()]
            .get_mut(index)
            .ok_or_else(|| EngineError::index(class.key(), index, SLOT_CAPACITY))
    }

    /// See [`ImageSlot::update`]. `names` holds one entry per part; `None`
    /// leaves that part empty.
    #[allow(clippy::too_many_arguments)]
    pub fn update<F>(
        &mut self,
        class: ImageClass,
        index: usize,
        asset: &str,
        names: Vec<Option<String>>,
        shift: (i32, i32),
        now: u64,
        is_cached: F,
    ) -> EngineResult<Vec<(usize, String)>>
    where
        F: Fn(&str) -> bool,
    {
        let transition_frames = self.transition_frames;
        let slot = self.slot_mut(class, index)?;
        Ok(slot.update(asset, names, shift, now, transition_frames, is_cached))
    }

    /// Applies a fetched texture. Out-of-range targets are treated as stale.
    pub fn deliver(&mut self, class: ImageClass, index: usize, part: usize, name: &str) -> bool {
        self.slot_mut(class, index)
            .map(|slot| slot.deliver(part, name))
            .unwrap_or(false)
    }

    pub fn fade(
        &mut self,
        class: ImageClass,
        index: usize,
        now: u64,
        frames: u32,
        from: u8,
        to: u8,
    ) -> EngineResult<()> {
        self.slot_mut(class, index)?.fade(now, frames, from, to);
        Ok(())
    }

    pub fn move_to(
        &mut self,
        class: ImageClass,
        index: usize,
        now: u64,
        frames: u32,
        target: (i32, i32),
    ) -> EngineResult<()> {
        self.slot_mut(class, index)?
            .move_to(now, frames, target.0, target.1);
        Ok(())
    }

    pub fn blend(&mut self, class: ImageClass, index: usize, alpha: u8) -> EngineResult<()> {
        self.slot_mut(class, index)?.blend(alpha);
        Ok(())
    }

    pub fn clear_slot(&mut self, class: ImageClass, index: usize) -> EngineResult<()> {
        self.slot_mut(class, index)?.clear();
        Ok(())
    }

    pub fn clear_class(&mut self, class: ImageClass) {
        for slot in &mut self.layers[class.index()] {
            slot.clear();
        }
    }

    pub fn clear_all(&mut self) {
        for class in ImageClass::ALL {
            self.clear_class(class);
        }
    }

    pub fn tick(&mut self, now: u64) {
        for slot in self.layers.iter_mut().flatten() {
            slot.tick(now);
        }
    }

    pub fn draw(&self, textures: &AssetCache<DecodedImage>) -> Vec<DrawCommand> {
        let mut draws = Vec::new();
        for class in ImageClass::RENDER_ORDER {
            for (index, slot) in self.layers[class.index()].iter().enumerate() {
                slot.draw(class, index, textures, &mut draws);
            }
        }
        draws
    }

    /// Every bound slot, in class then slot order.
    pub fn active(&self) -> impl Iterator<Item = (ImageClass, usize, &ImageSlot)> + '_ {
        ImageClass::ALL.into_iter().flat_map(move |class| {
            self.layers[class.index()]
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.is_active())
                .map(move |(index, slot)| (class, index, slot))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<Option<String>> {
        list.iter().map(|name| Some(name.to_string())).collect()
    }

    #[test]
    fn class_keys_round_trip() {
        for class in ImageClass::ALL {
            assert_eq!(ImageClass::from_key(class.key()), Some(class));
        }
        assert_eq!(ImageClass::from_key("sprite"), None);
        assert!(ImageClass::Fw.is_composite() && !ImageClass::Eg.is_composite());
    }

    #[test]
    fn out_of_range_slot_is_an_index_error() {
        let mut layers = ImageLayers::new(0);
        let err = layers
            .update(ImageClass::Bg, SLOT_CAPACITY, "bg01", names(&["bg01"]), (0, 0), 0, |_| true)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Index { class: "bg", index: 10, capacity: 10 }
        ));
        assert!(layers.fade(ImageClass::Cg, 42, 0, 1, 0, 255).is_err());
        assert!(!layers.deliver(ImageClass::Fw, 99, 0, "x"));
    }

    #[test]
    fn classes_are_isolated_and_cleared_independently() {
        let mut layers = ImageLayers::new(0);
        layers
            .update(ImageClass::Bg, 0, "bg01", names(&["bg01"]), (0, 0), 0, |_| true)
            .unwrap();
        layers
            .update(ImageClass::Eg, 0, "eg01", names(&["eg01"]), (0, 0), 0, |_| true)
            .unwrap();
        layers.clear_class(ImageClass::Bg);

        let active: Vec<_> = layers.active().map(|(class, index, _)| (class, index)).collect();
        assert_eq!(active, vec![(ImageClass::Eg, 0)]);
    }

    #[test]
    fn composite_parts_share_one_clock() {
        let mut layers = ImageLayers::new(0);
        layers
            .update(ImageClass::Cg, 1, "cg01", names(&["cg01_1", "cg01_001", "cg01_0001"]), (0, 0), 0, |_| true)
            .unwrap();
        layers.fade(ImageClass::Cg, 1, 0, 30, 0, 255).unwrap();
        layers.tick(15);
        let slot = layers.slot(ImageClass::Cg, 1).unwrap();
        assert_eq!(slot.alpha(), 128);
        assert!(slot.parts().iter().all(|part| part.bound.is_some()));
    }
}
