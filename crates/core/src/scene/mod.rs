//! Ordered layer stack and the per-layer parameter model.

mod layer;

pub use layer::*;

use crate::{Result, VizError};

/// Flat, ordered collection of layers. Indices are positional: removing a
/// layer shifts every higher index down by one.
#[derive(Debug, Clone, Default)]
pub struct LayerStack {
    layers: Vec<Layer>,
    selected: Option<usize>,
}

impl LayerStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_layers(layers: Vec<Layer>) -> Self {
        Self {
            layers: layers.iter().map(Layer::normalized).collect(),
            selected: None,
        }
    }

    /// Appends a layer and returns its index. Fields left unset in `params`
    /// inherit the selected layer's overrides, then the engine defaults.
    pub fn add(&mut self, style: StyleKind, params: LayerOverrides) -> usize {
        let inherited = match self.selected() {
            Some(selected) => params.or(&selected.overrides),
            None => params,
        };
        self.layers.push(Layer::new(style, inherited));
        self.layers.len() - 1
    }

    /// Removes the layer at `index`, preserving the order of the rest.
    pub fn remove(&mut self, index: usize) -> Result<Layer> {
        self.check(index)?;
        let removed = self.layers.remove(index);
        self.selected = match self.selected {
            Some(selected) if selected == index => None,
            Some(selected) if selected > index => Some(selected - 1),
            other => other,
        };
        Ok(removed)
    }

    /// Moves editing focus. Selection never changes render order or output.
    pub fn select(&mut self, index: usize) -> Result<()> {
        self.check(index)?;
        self.selected = Some(index);
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected(&self) -> Option<&Layer> {
        self.selected.and_then(|index| self.layers.get(index))
    }

    pub fn set_visible(&mut self, index: usize, visible: bool) -> Result<()> {
        self.get_mut(index)?.visible = visible;
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut Layer> {
        let len = self.layers.len();
        self.layers
            .get_mut(index)
            .ok_or(VizError::LayerIndex { index, len })
    }

    /// Read-only view of the stack in render order.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Fills `order` with the indices composited this frame: visible
    /// background layers first, then every other visible layer, each group in
    /// stack order.
    pub fn composite_order(&self, order: &mut Vec<usize>) {
        order.clear();
        let visible = || self.layers.iter().enumerate().filter(|(_, l)| l.visible);
        order.extend(
            visible()
                .filter(|(_, layer)| layer.style == StyleKind::Background)
                .map(|(index, _)| index),
        );
        order.extend(
            visible()
                .filter(|(_, layer)| layer.style != StyleKind::Background)
                .map(|(index, _)| index),
        );
    }

    fn check(&self, index: usize) -> Result<()> {
        if index < self.layers.len() {
            Ok(())
        } else {
            Err(VizError::LayerIndex {
                index,
                len: self.layers.len(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tinted(thickness: f32) -> LayerOverrides {
        LayerOverrides {
            thickness: Some(thickness),
            ..Default::default()
        }
    }

    #[test]
    fn removal_preserves_order() {
        let mut stack = LayerStack::new();
        stack.add(StyleKind::Bars, tinted(1.0));
        stack.add(StyleKind::Wave, tinted(2.0));
        stack.add(StyleKind::Ring, tinted(3.0));

        stack.remove(1).unwrap();

        let styles: Vec<_> = stack.layers().iter().map(|l| l.style).collect();
        assert_eq!(styles, vec![StyleKind::Bars, StyleKind::Ring]);

        let mut order = Vec::new();
        stack.composite_order(&mut order);
        assert_eq!(order, vec![0, 1]);
    }

    #[test]
    fn add_then_remove_leaves_empty_stack() {
        let mut stack = LayerStack::new();
        let index = stack.add(StyleKind::Radial, LayerOverrides::default());
        assert_eq!(index, 0);
        stack.remove(0).unwrap();
        assert!(stack.layers().is_empty());

        let err = stack.select(0).unwrap_err();
        assert!(matches!(err, VizError::LayerIndex { index: 0, len: 0 }));
        assert_eq!(stack.selected_index(), None);
    }

    #[test]
    fn backgrounds_composite_first() {
        let mut stack = LayerStack::new();
        stack.add(StyleKind::Circle, LayerOverrides::default());
        stack.add(StyleKind::Background, LayerOverrides::default());
        stack.add(StyleKind::Bars, LayerOverrides::default());
        stack.add(StyleKind::Background, LayerOverrides::default());
        stack.set_visible(2, false).unwrap();

        let mut order = Vec::new();
        stack.composite_order(&mut order);
        assert_eq!(order, vec![1, 3, 0]);
    }

    #[test]
    fn selection_tracks_removals() {
        let mut stack = LayerStack::new();
        for _ in 0..3 {
            stack.add(StyleKind::Bars, LayerOverrides::default());
        }
        stack.select(2).unwrap();
        stack.remove(0).unwrap();
        assert_eq!(stack.selected_index(), Some(1));
        stack.remove(1).unwrap();
        assert_eq!(stack.selected_index(), None);
    }

    #[test]
    fn new_layers_inherit_from_selection() {
        let mut stack = LayerStack::new();
        stack.add(StyleKind::Radial, tinted(3.0));
        stack.select(0).unwrap();

        let index = stack.add(
            StyleKind::Circle,
            LayerOverrides {
                segments: Some(4),
                ..Default::default()
            },
        );
        let layer = stack.get(index).unwrap();
        assert_eq!(layer.overrides.thickness, Some(3.0));
        assert_eq!(layer.overrides.segments, Some(4));
    }
}
