use std::cell::Cell;

use glam::{Mat4, Vec3};
use log::trace;

use crate::config::{LightConfig, ShadowConfig};

/// Near plane of the orthographic light frustum.
pub const LIGHT_NEAR_PLANE: f32 = 1.0;

/// Orthographic light transform used by the depth pass and for shadow lookups.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSpace {
    pub projection: Mat4,
    pub view: Mat4,
    pub matrix: Mat4,
}

impl LightSpace {
    /// Recomputed every frame; depends only on the light and shadow settings.
    pub fn new(light: &LightConfig, shadow: &ShadowConfig) -> Self {
        let half = shadow.map_size / 2.0;
        let projection = Mat4::orthographic_rh(
            -half,
            half,
            -half,
            half,
            LIGHT_NEAR_PLANE,
            LIGHT_NEAR_PLANE + shadow.depth_range,
        );
        let view = Mat4::look_at_rh(light.position, light.position + light.direction, Vec3::Y);
        Self {
            projection,
            view,
            matrix: projection * view,
        }
    }
}

/// Where draw calls currently land and with which viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTarget {
    Screen { width: u32, height: u32 },
    ShadowMap { width: u32, height: u32 },
}

impl RenderTarget {
    pub fn viewport(&self) -> (u32, u32) {
        match *self {
            RenderTarget::Screen { width, height } | RenderTarget::ShadowMap { width, height } => {
                (width, height)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowPassState {
    Idle,
    RenderingDepth,
}

/// Tracks the active render target across the depth and main passes.
#[derive(Debug)]
pub struct RenderTargets {
    screen: (u32, u32),
    shadow: (u32, u32),
    current: Cell<RenderTarget>,
}

impl RenderTargets {
    pub fn new(screen: (u32, u32), shadow: (u32, u32)) -> Self {
        Self {
            screen,
            shadow,
            current: Cell::new(RenderTarget::Screen {
                width: screen.0,
                height: screen.1,
            }),
        }
    }

    pub fn resize_screen(&mut self, width: u32, height: u32) {
        self.screen = (width.max(1), height.max(1));
        if self.state() == ShadowPassState::Idle {
            self.current.set(self.screen_target());
        }
    }

    pub fn current(&self) -> RenderTarget {
        self.current.get()
    }

    pub fn shadow_resolution(&self) -> (u32, u32) {
        self.shadow
    }

    pub fn state(&self) -> ShadowPassState {
        match self.current.get() {
            RenderTarget::Screen { .. } => ShadowPassState::Idle,
            RenderTarget::ShadowMap { .. } => ShadowPassState::RenderingDepth,
        }
    }

    /// Switches to the shadow map until the returned guard is dropped.
    pub fn begin_shadow_pass(&self) -> ShadowPassGuard<'_> {
        trace!("shadow pass at {}x{}", self.shadow.0, self.shadow.1);
        self.current.set(RenderTarget::ShadowMap {
            width: self.shadow.0,
            height: self.shadow.1,
        });
        ShadowPassGuard { targets: self }
    }

    fn screen_target(&self) -> RenderTarget {
        RenderTarget::Screen {
            width: self.screen.0,
            height: self.screen.1,
        }
    }
}

/// Restores the on-screen target on every exit path of the depth pass.
#[derive(Debug)]
pub struct ShadowPassGuard<'a> {
    targets: &'a RenderTargets,
}

impl ShadowPassGuard<'_> {
    pub fn viewport(&self) -> (u32, u32) {
        self.targets.current().viewport()
    }
}

impl Drop for ShadowPassGuard<'_> {
    fn drop(&mut self) {
        self.targets.current.set(self.targets.screen_target());
    }
}
