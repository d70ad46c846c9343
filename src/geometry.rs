use egui::Pos2;
use tiny_skia::Transform;

/// Placement of an element on the canvas: translate ∘ rotate ∘ scale about a
/// pivot. This is the single transform definition shared by the compositor
/// (forward, via [`Placement::matrix`]) and the hit tester (inverse, via
/// [`Placement::to_local`]); keeping both on one type keeps drawing and
/// picking consistent for any rotation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub pivot: Pos2,
    pub rotation_deg: f32,
    pub scale_x: f32,
    pub scale_y: f32,
}

impl Placement {
    pub fn new(pivot: Pos2, rotation_deg: f32) -> Self {
        Self {
            pivot,
            rotation_deg,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }

    /// Negative scale encodes a flip.
    pub fn with_scale(mut self, scale_x: f32, scale_y: f32) -> Self {
        self.scale_x = scale_x;
        self.scale_y = scale_y;
        self
    }

    /// Forward transform mapping local coordinates (origin at the pivot) to
    /// canvas coordinates. Scale applies first, then rotation, then the
    /// pivot translation.
    pub fn matrix(&self) -> Transform {
        Transform::from_translate(self.pivot.x, self.pivot.y)
            .pre_concat(Transform::from_rotate(self.rotation_deg))
            .pre_concat(Transform::from_scale(self.scale_x, self.scale_y))
    }

    /// Forward point mapping, equivalent to [`Placement::matrix`].
    pub fn to_canvas(&self, local: Pos2) -> Pos2 {
        let (sin, cos) = self.rotation_deg.to_radians().sin_cos();
        let x = local.x * self.scale_x;
        let y = local.y * self.scale_y;
        Pos2::new(
            self.pivot.x + x * cos - y * sin,
            self.pivot.y + x * sin + y * cos,
        )
    }

    /// Map a canvas point into the element's rotated frame by undoing the
    /// pivot translation and applying the inverse rotation. Scale is left to
    /// the caller: hit boxes are expressed in scaled local units.
    pub fn to_local(&self, point: Pos2) -> Pos2 {
        let dx = point.x - self.pivot.x;
        let dy = point.y - self.pivot.y;
        let (sin, cos) = (-self.rotation_deg).to_radians().sin_cos();
        Pos2::new(dx * cos - dy * sin, dx * sin + dy * cos)
    }
}

#[cfg(test)]
mod tests {
    use super::Placement;
    use egui::Pos2;

    fn close(a: Pos2, b: Pos2) -> bool {
        (a.x - b.x).abs() < 1e-3 && (a.y - b.y).abs() < 1e-3
    }

    #[test]
    fn pivot_maps_to_local_origin() {
        for rotation in [0.0, 37.0, -90.0, 180.0, 723.5] {
            let placement = Placement::new(Pos2::new(40.0, 25.0), rotation);
            assert!(close(placement.to_local(Pos2::new(40.0, 25.0)), Pos2::ZERO));
        }
    }

    #[test]
    fn forward_then_inverse_round_trips() {
        let placement = Placement::new(Pos2::new(10.0, -4.0), 63.0);
        let local = Pos2::new(7.5, -2.0);
        let canvas = placement.to_canvas(local);
        assert!(close(placement.to_local(canvas), local));
    }

    #[test]
    fn quarter_turn_swaps_axes() {
        let placement = Placement::new(Pos2::ZERO, 90.0);
        // Forward: local +x becomes canvas +y.
        assert!(close(placement.to_canvas(Pos2::new(1.0, 0.0)), Pos2::new(0.0, 1.0)));
        // Inverse undoes it.
        assert!(close(placement.to_local(Pos2::new(0.0, 1.0)), Pos2::new(1.0, 0.0)));
    }

    #[test]
    fn scale_applies_before_rotation() {
        let placement = Placement::new(Pos2::ZERO, 90.0).with_scale(2.0, 1.0);
        assert!(close(placement.to_canvas(Pos2::new(1.0, 0.0)), Pos2::new(0.0, 2.0)));
    }
}
