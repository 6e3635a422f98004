use hypertext::prelude::*;

/// A labelled `<select>` whose option matching `selected` is preselected.
pub struct Select<'r> {
    pub name: &'r str,
    pub label: &'r str,
    pub options: &'r [(String, String)],
    pub selected: &'r str,
}

impl<'r> Renderable for Select<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            div class="col-md-auto" {
                label class="form-label" for=(self.name) { (self.label) }
                select class="form-select" id=(self.name) name=(self.name) {
                    @for (value, text) in self.options {
                        option value=(value) selected[value == self.selected] { (text) }
                    }
                }
            }
        }
        .render_to(buffer);
    }
}

/// Builds select options from `(value, label)` pairs.
pub fn options<'a>(
    pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Vec<(String, String)> {
    pairs
        .into_iter()
        .map(|(value, label)| (value.to_string(), label.to_string()))
        .collect()
}
