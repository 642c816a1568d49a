use rocket::Responder;
use rocket::request::FlashMessage;
use rocket::response::{Flash, Redirect};
use rocket_dyn_templates::Template;
use serde::Serialize;

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct FlashView {
    pub kind: String,
    pub message: String,
}

impl FlashView {
    pub fn from_message(flash: Option<FlashMessage<'_>>) -> Option<Self> {
        flash.map(|flash| Self {
            kind: flash.kind().to_string(),
            message: flash.message().to_string(),
        })
    }
}

/// A form handler either re-renders its page or redirects with a flash.
#[derive(Responder)]
pub enum Reply {
    Page(Template),
    Redirect(Flash<Redirect>),
}

impl From<Template> for Reply {
    fn from(template: Template) -> Self {
        Reply::Page(template)
    }
}

impl From<Flash<Redirect>> for Reply {
    fn from(redirect: Flash<Redirect>) -> Self {
        Reply::Redirect(redirect)
    }
}
