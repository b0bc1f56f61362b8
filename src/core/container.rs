//! Render targets a terminal session can be opened on.
//!
//! A container is whatever surface the terminal draws into: a region of the
//! host terminal window, a widget, or a fixed-size test double. The session
//! only needs its pixel size, padding, and whether it is attached.

use std::cell::Cell;
use std::rc::Rc;

/// Size of a container in pixels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Inner padding of a container in pixels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Padding {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

/// A surface a terminal engine can attach to
pub trait Container {
    /// Current outer size
    fn size_px(&self) -> PixelSize;

    fn padding(&self) -> Padding {
        Padding::default()
    }

    /// Whether the container is part of a live UI and can host a terminal
    fn is_attached(&self) -> bool {
        true
    }
}

impl<T: Container + ?Sized> Container for Rc<T> {
    fn size_px(&self) -> PixelSize {
        (**self).size_px()
    }

    fn padding(&self) -> Padding {
        (**self).padding()
    }

    fn is_attached(&self) -> bool {
        (**self).is_attached()
    }
}

impl<T: Container + ?Sized> Container for Box<T> {
    fn size_px(&self) -> PixelSize {
        (**self).size_px()
    }

    fn padding(&self) -> Padding {
        (**self).padding()
    }

    fn is_attached(&self) -> bool {
        (**self).is_attached()
    }
}

/// A container with an explicitly set size
///
/// Size and attachment use interior mutability so a shared handle
/// (`Rc<FixedContainer>`) can be resized while a session owns another.
#[derive(Debug, Default)]
pub struct FixedContainer {
    size: Cell<PixelSize>,
    padding: Cell<Padding>,
    attached: Cell<bool>,
}

impl FixedContainer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: Cell::new(PixelSize::new(width, height)),
            padding: Cell::new(Padding::default()),
            attached: Cell::new(true),
        }
    }

    /// A container that is not part of any UI yet
    pub fn detached(width: u32, height: u32) -> Self {
        let container = Self::new(width, height);
        container.attached.set(false);
        container
    }

    pub fn set_size(&self, width: u32, height: u32) {
        self.size.set(PixelSize::new(width, height));
    }

    pub fn set_padding(&self, padding: Padding) {
        self.padding.set(padding);
    }

    pub fn set_attached(&self, attached: bool) {
        self.attached.set(attached);
    }
}

impl Container for FixedContainer {
    fn size_px(&self) -> PixelSize {
        self.size.get()
    }

    fn padding(&self) -> Padding {
        self.padding.get()
    }

    fn is_attached(&self) -> bool {
        self.attached.get()
    }
}
