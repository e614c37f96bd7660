//! Screen geometry collaborator
//!
//! The event builders only need two things from the window system: the
//! screen a device's sprite is currently on, and a way to place the sprite
//! (which may clamp it or move it onto a neighbouring screen).
//! [`ScreenLayout`] is a simple implementation with screens side by side.

use std::collections::HashMap;

use crate::device::DeviceId;

/// Pixel extent of a screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Screen {
    pub index: usize,
    pub width: i32,
    pub height: i32,
}

impl Screen {
    pub fn new(index: usize, width: i32, height: i32) -> Self {
        Self {
            index,
            width,
            height,
        }
    }
}

/// Window-system side of sprite placement.
pub trait ScreenGeometry {
    /// Screen the device's sprite is on, if the device has a sprite at all.
    fn current_screen(&self, device: DeviceId) -> Option<Screen>;

    /// Place the sprite at `x`/`y` on the current screen.
    ///
    /// Implementations may clamp the coordinates or move the sprite to a
    /// different screen; `x` and `y` hold the final position on return and
    /// the returned screen is the one the sprite ended up on.
    fn set_sprite_position(&mut self, device: DeviceId, x: &mut i32, y: &mut i32) -> Screen;
}

/// Screens laid out left to right, sharing a top edge.
///
/// Moving past the left or right edge of a screen continues on the
/// neighbouring screen; every other edge clamps.
#[derive(Debug, Clone)]
pub struct ScreenLayout {
    screens: Vec<Screen>,
    sprites: HashMap<DeviceId, usize>,
}

impl ScreenLayout {
    /// Create a layout from `(width, height)` pairs. An empty list yields a
    /// single 1024x768 screen.
    pub fn new(sizes: &[(i32, i32)]) -> Self {
        let screens = if sizes.is_empty() {
            vec![Screen::new(0, 1024, 768)]
        } else {
            sizes
                .iter()
                .enumerate()
                .map(|(index, &(w, h))| Screen::new(index, w, h))
                .collect()
        };

        Self {
            screens,
            sprites: HashMap::new(),
        }
    }

    pub fn single(width: i32, height: i32) -> Self {
        Self::new(&[(width, height)])
    }

    pub fn screens(&self) -> &[Screen] {
        &self.screens
    }

    /// Move `device`'s sprite onto screen `index` without touching its position.
    pub fn set_current_screen(&mut self, device: DeviceId, index: usize) {
        if index < self.screens.len() {
            self.sprites.insert(device, index);
        }
    }

    fn screen_index(&self, device: DeviceId) -> usize {
        self.sprites.get(&device).copied().unwrap_or(0)
    }
}

impl ScreenGeometry for ScreenLayout {
    fn current_screen(&self, device: DeviceId) -> Option<Screen> {
        self.screens.get(self.screen_index(device)).copied()
    }

    fn set_sprite_position(&mut self, device: DeviceId, x: &mut i32, y: &mut i32) -> Screen {
        let mut index = self.screen_index(device);

        if *x < 0 && index > 0 {
            index -= 1;
            *x += self.screens[index].width;
        } else if *x >= self.screens[index].width && index + 1 < self.screens.len() {
            *x -= self.screens[index].width;
            index += 1;
        }

        let screen = self.screens[index];
        *x = (*x).clamp(0, (screen.width - 1).max(0));
        *y = (*y).clamp(0, (screen.height - 1).max(0));

        if index != self.screen_index(device) {
            tracing::trace!("sprite of device {} crossed to screen {}", device, index);
        }
        self.sprites.insert(device, index);
        screen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_has_one_screen() {
        let layout = ScreenLayout::new(&[]);
        assert_eq!(layout.screens().len(), 1);
        let screen = layout.current_screen(DeviceId(2)).unwrap();
        assert_eq!((screen.width, screen.height), (1024, 768));
    }

    #[test]
    fn test_clamps_within_single_screen() {
        let mut layout = ScreenLayout::single(800, 600);
        let (mut x, mut y) = (-5, 900);
        let screen = layout.set_sprite_position(DeviceId(2), &mut x, &mut y);
        assert_eq!(screen.index, 0);
        assert_eq!((x, y), (0, 599));
    }

    #[test]
    fn test_crosses_to_right_and_back() {
        let mut layout = ScreenLayout::new(&[(800, 600), (1024, 768)]);
        let dev = DeviceId(2);

        let (mut x, mut y) = (810, 100);
        let screen = layout.set_sprite_position(dev, &mut x, &mut y);
        assert_eq!(screen.index, 1);
        assert_eq!((x, y), (10, 100));
        assert_eq!(layout.current_screen(dev).unwrap().index, 1);

        let (mut x, mut y) = (-20, 700);
        let screen = layout.set_sprite_position(dev, &mut x, &mut y);
        assert_eq!(screen.index, 0);
        assert_eq!((x, y), (780, 599));
    }
}
