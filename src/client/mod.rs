//! Client - joins a hosted room and renders its traffic

mod input;
mod link;
mod renderer;

pub use input::{parse_input, ParsedInput};
pub use link::{ConnectError, LinkError, RemoteLink, DEFAULT_CONNECT_TIMEOUT};
pub use renderer::{render_event, strip_ansi_codes, HELP_LINES};
