use hypertext::prelude::*;

/// A row of link buttons. A count, when present, is shown as a badge next
/// to the label.
pub struct Actions<'r> {
    pub options: &'r [(&'r str, &'r str, Option<i64>)],
}

impl<'r> Renderable for Actions<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            div class="row mt-3 mb-3 g-2" {
                @for (link, text, count) in self.options {
                    div class="col-md-auto" {
                        a class="btn btn-primary" href=(link) {
                            (text)
                            @if let Some(count) = count {
                                span class="badge text-bg-light ms-2" { (count) }
                            }
                        }
                    }
                }
            }
        }
        .render_to(buffer);
    }
}
