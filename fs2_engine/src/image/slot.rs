use log::debug;

use crate::cache::AssetCache;
use crate::codec::DecodedImage;
use crate::render::DrawCommand;

use super::ImageClass;

/// Plain slots carry one image; composites carry three parts that share the
/// slot's shift, alpha and animation clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Plain,
    Composite { offset: (i32, i32) },
}

impl SlotKind {
    pub fn part_count(self) -> usize {
        match self {
            SlotKind::Plain => 1,
            SlotKind::Composite { .. } => 3,
        }
    }

    fn offset(self) -> (i32, i32) {
        match self {
            SlotKind::Plain => (0, 0),
            SlotKind::Composite { offset } => offset,
        }
    }
}

/// Binding state of one drawable part.
///
/// `target` is the authoritative name; `bound` is the name whose texture is
/// on screen; `previous` is the outgoing binding during a cross-fade.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Part {
    pub target: Option<String>,
    pub bound: Option<String>,
    pub previous: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ramp<T> {
    start: u64,
    frames: u32,
    from: T,
    to: T,
}

impl<T: Lerp> Ramp<T> {
    /// Value at `now`, and whether the ramp has finished.
    fn sample(&self, now: u64) -> (T, bool) {
        let elapsed = now.saturating_sub(self.start);
        if elapsed >= u64::from(self.frames) {
            return (self.to, true);
        }
        (T::lerp(self.from, self.to, elapsed, self.frames), false)
    }
}

trait Lerp: Copy {
    fn lerp(from: Self, to: Self, elapsed: u64, frames: u32) -> Self;
}

fn mix(from: i64, to: i64, elapsed: u64, frames: u32) -> i64 {
    let t = elapsed as f64 / f64::from(frames);
    from + ((to - from) as f64 * t).round() as i64
}

impl Lerp for u8 {
    fn lerp(from: u8, to: u8, elapsed: u64, frames: u32) -> u8 {
        mix(i64::from(from), i64::from(to), elapsed, frames).clamp(0, 255) as u8
    }
}

impl Lerp for (i32, i32) {
    fn lerp(from: (i32, i32), to: (i32, i32), elapsed: u64, frames: u32) -> (i32, i32) {
        (
            mix(i64::from(from.0), i64::from(to.0), elapsed, frames) as i32,
            mix(i64::from(from.1), i64::from(to.1), elapsed, frames) as i32,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSlot {
    kind: SlotKind,
    asset: Option<String>,
    parts: Vec<Part>,
    shift: (i32, i32),
    alpha: u8,
    previous_alpha: u8,
    fade: Option<Ramp<u8>>,
    movement: Option<Ramp<(i32, i32)>>,
    transition: Option<Ramp<u8>>,
    pending_blend: Option<u8>,
}

impl ImageSlot {
    pub fn new(kind: SlotKind) -> Self {
        ImageSlot {
            kind,
            asset: None,
            parts: vec![Part::default(); kind.part_count()],
            shift: (0, 0),
            alpha: u8::MAX,
            previous_alpha: 0,
            fade: None,
            movement: None,
            transition: None,
            pending_blend: None,
        }
    }

    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    /// Logical name the slot was bound with; for composites this is the raw
    /// comma-separated argument.
    pub fn asset(&self) -> Option<&str> {
        self.asset.as_deref()
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn shift(&self) -> (i32, i32) {
        self.shift
    }

    pub fn alpha(&self) -> u8 {
        self.alpha
    }

    pub fn is_active(&self) -> bool {
        self.asset.is_some()
    }

    pub fn fading(&self) -> bool {
        self.fade.is_some()
    }

    pub fn moving(&self) -> bool {
        self.movement.is_some()
    }

    pub fn transitioning(&self) -> bool {
        self.transition.is_some()
    }

    /// Rebinds the slot. Targets are written before anything is fetched so a
    /// late completion can always be checked against the latest intent.
    /// Returns the `(part, name)` pairs that still need fetching.
    pub fn update<F>(
        &mut self,
        asset: &str,
        names: Vec<Option<String>>,
        shift: (i32, i32),
        now: u64,
        transition_frames: u32,
        is_cached: F,
    ) -> Vec<(usize, String)>
    where
        F: Fn(&str) -> bool,
    {
        self.asset = Some(asset.to_string());
        self.shift = shift;
        self.movement = None;

        let mut outgoing = false;
        let mut fetches = Vec::new();
        for (index, part) in self.parts.iter_mut().enumerate() {
            let name = names.get(index).cloned().flatten();
            part.previous = None;
            if transition_frames > 0 && part.bound.is_some() && part.bound != name {
                part.previous = part.bound.take();
                outgoing = true;
            }
            part.bound = None;
            part.target = name.clone();

            if let Some(name) = name {
                if is_cached(&name) {
                    part.bound = Some(name);
                } else {
                    fetches.push((index, name));
                }
            }
        }

        self.transition = outgoing.then_some(Ramp {
            start: now,
            frames: transition_frames,
            from: u8::MAX,
            to: 0,
        });
        self.previous_alpha = if outgoing { u8::MAX } else { 0 };
        fetches
    }

    /// Binds a fetched texture if the part still wants it.
    pub fn deliver(&mut self, part: usize, name: &str) -> bool {
        let Some(slot_part) = self.parts.get_mut(part) else {
            return false;
        };
        if slot_part.target.as_deref() != Some(name) {
            debug!("discarding stale image {name} for part {part}");
            return false;
        }
        slot_part.bound = Some(name.to_string());
        true
    }

    pub fn fade(&mut self, now: u64, frames: u32, from: u8, to: u8) {
        self.alpha = from;
        self.pending_blend = None;
        self.fade = Some(Ramp {
            start: now,
            frames,
            from,
            to,
        });
    }

    pub fn move_to(&mut self, now: u64, frames: u32, x: i32, y: i32) {
        self.movement = Some(Ramp {
            start: now,
            frames,
            from: self.shift,
            to: (x, y),
        });
    }

    /// Jumps to `alpha` on the next tick, cancelling any fade.
    pub fn blend(&mut self, alpha: u8) {
        self.fade = None;
        self.pending_blend = Some(alpha);
    }

    pub fn clear(&mut self) {
        *self = ImageSlot::new(self.kind);
    }

    pub fn tick(&mut self, now: u64) {
        if let Some(alpha) = self.pending_blend.take() {
            self.alpha = alpha;
        }
        if let Some(ramp) = self.fade {
            let (alpha, done) = ramp.sample(now);
            self.alpha = alpha;
            if done {
                self.fade = None;
            }
        }
        if let Some(ramp) = self.movement {
            let (shift, done) = ramp.sample(now);
            self.shift = shift;
            if done {
                self.movement = None;
            }
        }
        if let Some(ramp) = self.transition {
            let (alpha, done) = ramp.sample(now);
            self.previous_alpha = alpha;
            if done {
                self.transition = None;
                for part in &mut self.parts {
                    part.previous = None;
                }
            }
        }
    }

    /// Appends draw commands for every part whose texture is resident.
    pub fn draw(
        &self,
        class: ImageClass,
        slot: usize,
        textures: &AssetCache<DecodedImage>,
        out: &mut Vec<DrawCommand>,
    ) {
        if !self.is_active() {
            return;
        }
        let (dx, dy) = self.kind.offset();
        let shift = (self.shift.0 + dx, self.shift.1 + dy);
        let incoming = if self.transitioning() {
            scale(self.alpha, u8::MAX - self.previous_alpha)
        } else {
            self.alpha
        };

        for (index, part) in self.parts.iter().enumerate() {
            let layers = [
                (part.previous.as_deref(), scale(self.alpha, self.previous_alpha)),
                (part.bound.as_deref(), incoming),
            ];
            for (name, alpha) in layers {
                let Some(name) = name else { continue };
                let Some(texture) = textures.get(name) else {
                    continue;
                };
                let (x, y) = texture.position(shift);
                out.push(DrawCommand {
                    class,
                    slot,
                    part: index,
                    name: name.to_string(),
                    x,
                    y,
                    width: texture.info.width,
                    height: texture.info.height,
                    alpha,
                });
            }
        }
    }
}

fn scale(alpha: u8, factor: u8) -> u8 {
    ((u16::from(alpha) * u16::from(factor) + 127) / 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use fs2_formats::StdInfo;
    use std::sync::Arc;

    fn composite() -> ImageSlot {
        ImageSlot::new(SlotKind::Composite { offset: (90, 160) })
    }

    fn parts(names: &[&str]) -> Vec<Option<String>> {
        names.iter().map(|name| Some(name.to_string())).collect()
    }

    fn texture(offset_x: i32, base_x: i32) -> DecodedImage {
        DecodedImage {
            info: StdInfo {
                width: 10,
                height: 20,
                offset_x,
                base_x,
                ..StdInfo::default()
            },
            pixels: Arc::new(Vec::new()),
        }
    }

    #[test]
    fn fade_interpolates_and_snaps() {
        let mut slot = composite();
        slot.update("cg01", parts(&["a", "b", "c"]), (0, 0), 0, 0, |_| true);
        slot.fade(100, 30, 0, 255);
        assert!(slot.fading());

        let mut last = 0;
        for now in 100..=130 {
            slot.tick(now);
            assert!(slot.alpha() >= last);
            last = slot.alpha();
        }
        assert_eq!(slot.alpha(), 255);
        assert!(!slot.fading());

        slot.fade(0, 30, 0, 255);
        slot.tick(15);
        assert_eq!(slot.alpha(), 128);
    }

    #[test]
    fn move_interpolates_shift() {
        let mut slot = ImageSlot::new(SlotKind::Plain);
        slot.update("bg", parts(&["bg"]), (0, 10), 0, 0, |_| true);
        slot.move_to(10, 4, 100, -10);
        slot.tick(12);
        assert_eq!(slot.shift(), (50, 0));
        assert!(slot.moving());
        slot.tick(14);
        assert_eq!(slot.shift(), (100, -10));
        assert!(!slot.moving());
    }

    #[test]
    fn blend_applies_on_next_tick_and_cancels_fade() {
        let mut slot = ImageSlot::new(SlotKind::Plain);
        slot.fade(0, 10, 0, 255);
        slot.blend(64);
        assert_eq!(slot.alpha(), 0);
        slot.tick(5);
        assert_eq!(slot.alpha(), 64);
        assert!(!slot.fading());
    }

    #[test]
    fn stale_delivery_is_ignored() {
        let mut slot = ImageSlot::new(SlotKind::Plain);
        let fetch = slot.update("a", parts(&["a"]), (0, 0), 0, 0, |_| false);
        assert_eq!(fetch, vec![(0, "a".to_string())]);
        slot.update("b", parts(&["b"]), (0, 0), 0, 0, |_| false);

        assert!(!slot.deliver(0, "a"));
        assert_eq!(slot.parts()[0].bound, None);
        assert!(slot.deliver(0, "b"));
        assert_eq!(slot.parts()[0].bound.as_deref(), Some("b"));
    }

    #[test]
    fn clear_cancels_animation_and_binding() {
        let mut slot = composite();
        slot.update("cg", parts(&["a", "b", "c"]), (3, 4), 0, 0, |_| true);
        slot.fade(0, 10, 0, 255);
        slot.move_to(0, 10, 9, 9);
        slot.clear();
        assert!(!slot.is_active());
        assert!(!slot.fading() && !slot.moving());
        assert_eq!(slot.parts().len(), 3);
        assert_eq!(slot.alpha(), 255);
    }

    #[test]
    fn crossfade_draws_outgoing_binding_until_done() {
        let mut cache = AssetCache::default();
        cache.insert_if_absent("old", texture(0, 0));
        cache.insert_if_absent("new", texture(0, 0));

        let mut slot = ImageSlot::new(SlotKind::Plain);
        slot.update("old", parts(&["old"]), (0, 0), 0, 10, |name| cache.contains(name));
        assert!(!slot.transitioning());
        slot.update("new", parts(&["new"]), (0, 0), 0, 10, |name| cache.contains(name));
        assert!(slot.transitioning());

        slot.tick(5);
        let mut draws = Vec::new();
        slot.draw(ImageClass::Bg, 0, &cache, &mut draws);
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].name, "old");
        assert_eq!(draws[1].name, "new");
        assert_eq!(u16::from(draws[0].alpha) + u16::from(draws[1].alpha), 255);

        slot.tick(10);
        draws.clear();
        slot.draw(ImageClass::Bg, 0, &cache, &mut draws);
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].alpha, 255);
    }

    #[test]
    fn draw_applies_base_point_and_composite_offset() {
        let mut cache = AssetCache::default();
        cache.insert_if_absent("tchi_1", texture(300, 100));

        let mut slot = composite();
        slot.update(
            "tchi,1,1,2,3",
            vec![Some("tchi_1".into()), None, None],
            (5, 0),
            0,
            0,
            |name| cache.contains(name),
        );
        let mut draws = Vec::new();
        slot.draw(ImageClass::Fw, 2, &cache, &mut draws);
        assert_eq!(draws.len(), 1);
        assert_eq!((draws[0].x, draws[0].y), (300 - 100 + 5 + 90, 160));
        assert_eq!((draws[0].width, draws[0].height), (10, 20));
    }
}
