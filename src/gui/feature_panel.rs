//! Feature panel widget.

use std::collections::HashMap;

use egui::Ui;
use tracing::warn;

use crate::control::{Control, ControlIndex, ControlSynchronizer, Widget};
use crate::feature::{FeatureId, Value, Visibility};

/// Something the user did to a control during one repaint.
#[derive(Debug, Clone, PartialEq)]
enum PanelAction {
    Edit(FeatureId, Value),
    Activate(FeatureId),
}

/// Draws a [`ControlSynchronizer`] and feeds user input back into it.
///
/// Input is collected while drawing and applied afterwards, so the synchroniser is only
/// borrowed mutably once per repaint.
#[derive(Debug, Default)]
pub struct FeaturePanel {
    /// Text being typed into string controls, committed when the field loses focus.
    drafts: HashMap<FeatureId, String>,
}

impl FeaturePanel {
    /// Panel with no pending text edits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw the visibility selector and every visible control.
    pub fn show(&mut self, ui: &mut Ui, sync: &mut ControlSynchronizer) {
        let mut level = sync.visibility_level();
        ui.horizontal(|ui| {
            ui.label("Visibility:");
            egui::ComboBox::from_id_salt("visibility_level")
                .selected_text(level.as_str())
                .show_ui(ui, |ui| {
                    for candidate in Visibility::ALL {
                        ui.selectable_value(&mut level, candidate, candidate.as_str());
                    }
                });
        });
        if level != sync.visibility_level() {
            sync.set_visibility_level(level);
        }
        ui.separator();

        if sync.is_empty() {
            ui.label("No camera features");
            return;
        }

        let mut actions = Vec::new();
        egui::ScrollArea::vertical().show(ui, |ui| {
            for &idx in sync.roots() {
                self.draw(ui, sync, idx, &mut actions);
            }
        });

        for action in actions {
            let result = match action {
                PanelAction::Edit(id, value) => sync.user_edit(id, value),
                PanelAction::Activate(id) => sync.activate(id),
            };
            if let Err(e) = result {
                warn!(error = %e, "Control edit failed");
            }
        }
    }

    fn draw(
        &mut self,
        ui: &mut Ui,
        sync: &ControlSynchronizer,
        idx: ControlIndex,
        actions: &mut Vec<PanelAction>,
    ) {
        let control = sync.get(idx);
        if !control.visible {
            return;
        }
        if let Widget::Group { children } = &control.widget {
            egui::CollapsingHeader::new(control.label.as_str())
                .id_salt(control.id.to_string())
                .default_open(true)
                .show(ui, |ui| {
                    for &child in children {
                        self.draw(ui, sync, child, actions);
                    }
                });
            return;
        }
        ui.push_id(control.id.to_string(), |ui| self.draw_leaf(ui, control, actions));
    }

    fn draw_leaf(&mut self, ui: &mut Ui, control: &Control, actions: &mut Vec<PanelAction>) {
        let id = control.id;
        let enabled = control.enabled;
        match &control.widget {
            Widget::SpinBox {
                value,
                min,
                max,
                step,
            } => {
                ui.horizontal(|ui| {
                    ui.label(control.label.as_str());
                    let mut edited = *value;
                    let response = ui.add_enabled(
                        enabled,
                        egui::DragValue::new(&mut edited)
                            .range(*min..=*max)
                            .speed(*step as f64),
                    );
                    let edited = snap_to_grid(edited, *min, *step);
                    if response.changed() && edited != *value {
                        actions.push(PanelAction::Edit(id, Value::Int(edited)));
                    }
                });
            }
            Widget::FloatField {
                value,
                min,
                max,
                step,
            } => {
                ui.horizontal(|ui| {
                    ui.label(control.label.as_str());
                    let mut edited = *value;
                    let mut drag = egui::DragValue::new(&mut edited).range(*min..=*max);
                    if let Some(step) = step {
                        drag = drag.speed(*step);
                    }
                    let response = ui.add_enabled(enabled, drag);
                    if response.changed() && edited != *value {
                        actions.push(PanelAction::Edit(id, Value::Float(edited)));
                    }
                });
            }
            Widget::Checkbox { checked } => {
                let mut edited = *checked;
                let response =
                    ui.add_enabled(enabled, egui::Checkbox::new(&mut edited, control.label.as_str()));
                if response.changed() {
                    actions.push(PanelAction::Edit(id, Value::Bool(edited)));
                }
            }
            Widget::ComboBox { items, selected } => {
                ui.horizontal(|ui| {
                    ui.label(control.label.as_str());
                    let mut edited = selected.clone();
                    ui.add_enabled_ui(enabled, |ui| {
                        egui::ComboBox::from_id_salt(id.to_string())
                            .selected_text(selected.as_str())
                            .show_ui(ui, |ui| {
                                for item in items {
                                    ui.selectable_value(&mut edited, item.clone(), item.as_str());
                                }
                            });
                    });
                    if edited != *selected {
                        actions.push(PanelAction::Edit(id, Value::Text(edited)));
                    }
                });
            }
            Widget::LineEdit { text } => {
                ui.horizontal(|ui| {
                    ui.label(control.label.as_str());
                    let draft = self.drafts.entry(id).or_insert_with(|| text.clone());
                    let response = ui.add_enabled(enabled, egui::TextEdit::singleline(draft));
                    if response.lost_focus() {
                        if let Some(draft) = self.drafts.remove(&id) {
                            if draft != *text {
                                actions.push(PanelAction::Edit(id, Value::Text(draft)));
                            }
                        }
                    } else if !response.has_focus() {
                        // Not being edited: follow the camera.
                        self.drafts.remove(&id);
                    }
                });
            }
            Widget::Button => {
                if ui
                    .add_enabled(enabled, egui::Button::new(control.label.as_str()))
                    .clicked()
                {
                    actions.push(PanelAction::Activate(id));
                }
            }
            Widget::Group { .. } => {}
        }
    }
}

/// Round `value` down onto the grid `min + k * step`.
///
/// Values the grid arithmetic cannot represent are returned unchanged.
fn snap_to_grid(value: i64, min: i64, step: i64) -> i64 {
    if step <= 1 {
        return value;
    }
    match value.checked_sub(min) {
        Some(offset) => value - offset.rem_euclid(step),
        None => value,
    }
}
