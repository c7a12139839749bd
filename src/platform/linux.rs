use super::{EventSink, IdleProbe, ProcessResolver, StopSignal, WindowEventSource};
use crate::app_names::AppNameTable;
use crate::constants::UNKNOWN_APP;
use crate::error::PlatformError;
use crate::models::WindowHandle;
use log::{debug, info, warn};
use std::sync::Arc;
use x11rb::connection::Connection;
use x11rb::protocol::screensaver;
use x11rb::protocol::xproto::{
    Atom, AtomEnum, ChangeWindowAttributesAux, ClientMessageEvent, ConnectionExt,
    CreateWindowAux, EventMask, Window, WindowClass,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::{COPY_DEPTH_FROM_PARENT, COPY_FROM_PARENT};

const WAKE_ATOM_NAME: &str = "DWELL_LISTENER_WAKE";

struct Atoms {
    net_active_window: Atom,
    wake: Atom,
}

/// X11 backend: `_NET_ACTIVE_WINDOW` notifications, `WM_CLASS` identities and
/// MIT-SCREEN-SAVER idle time.
pub struct X11Platform {
    conn: Arc<RustConnection>,
    root: Window,
    /// Unmapped input-only window used to wake the listener loop.
    wake_window: Window,
    atoms: Atoms,
    names: Arc<AppNameTable>,
}

impl X11Platform {
    pub fn connect(names: Arc<AppNameTable>) -> Result<Self, PlatformError> {
        let (conn, screen_num) = x11rb::connect(None)?;
        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .ok_or_else(|| {
                PlatformError::Unavailable(format!("invalid screen number {screen_num}"))
            })?;

        let atoms = Atoms {
            net_active_window: intern_atom(&conn, "_NET_ACTIVE_WINDOW")?,
            wake: intern_atom(&conn, WAKE_ATOM_NAME)?,
        };

        let wake_window = conn.generate_id()?;
        conn.create_window(
            COPY_DEPTH_FROM_PARENT,
            wake_window,
            root,
            0,
            0,
            1,
            1,
            0,
            WindowClass::INPUT_ONLY,
            COPY_FROM_PARENT,
            &CreateWindowAux::new(),
        )?
        .check()?;

        info!("Connected to X server (screen {screen_num})");

        Ok(Self {
            conn: Arc::new(conn),
            root,
            wake_window,
            atoms,
            names,
        })
    }

    fn active_window_id(&self) -> Result<Option<Window>, PlatformError> {
        let reply = self
            .conn
            .get_property(
                false,
                self.root,
                self.atoms.net_active_window,
                AtomEnum::WINDOW,
                0,
                1,
            )?
            .reply()?;

        Ok(reply
            .value32()
            .and_then(|mut values| values.next())
            .filter(|window| *window != x11rb::NONE))
    }

    fn window_class(&self, window: Window) -> Result<Option<String>, PlatformError> {
        let reply = self
            .conn
            .get_property(false, window, AtomEnum::WM_CLASS, AtomEnum::STRING, 0, 1024)?
            .reply()?;

        if reply.value.is_empty() {
            return Ok(None);
        }

        // WM_CLASS is "instance\0class\0"; prefer the instance name
        let raw = String::from_utf8_lossy(&reply.value);
        Ok(raw
            .split('\0')
            .find(|part| !part.is_empty())
            .map(str::to_string))
    }

    fn request_wake(conn: &RustConnection, wake_window: Window, wake_atom: Atom) {
        let event = ClientMessageEvent::new(32, wake_window, wake_atom, [0u32; 5]);
        let sent = conn
            .send_event(false, wake_window, EventMask::NO_EVENT, event)
            .map(|_| ())
            .and_then(|()| conn.flush());
        if let Err(e) = sent {
            warn!("Failed to wake X11 listener: {e}");
        }
    }
}

fn intern_atom(conn: &RustConnection, name: &str) -> Result<Atom, PlatformError> {
    Ok(conn.intern_atom(false, name.as_bytes())?.reply()?.atom)
}

impl ProcessResolver for X11Platform {
    fn resolve(&self, window: WindowHandle) -> String {
        let Ok(xid) = Window::try_from(window.0) else {
            return UNKNOWN_APP.to_string();
        };

        match self.window_class(xid) {
            Ok(Some(class)) => self.names.friendly_name(&class),
            Ok(None) => UNKNOWN_APP.to_string(),
            Err(e) => {
                debug!("Could not read WM_CLASS of {window}: {e}");
                UNKNOWN_APP.to_string()
            }
        }
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        match self.active_window_id() {
            Ok(window) => window.map(|xid| WindowHandle(u64::from(xid))),
            Err(e) => {
                debug!("Could not read _NET_ACTIVE_WINDOW: {e}");
                None
            }
        }
    }
}

impl IdleProbe for X11Platform {
    fn idle_seconds(&self) -> Result<f64, PlatformError> {
        let info = screensaver::query_info(self.conn.as_ref(), self.root)?.reply()?;
        Ok(f64::from(info.ms_since_user_input) / 1000.0)
    }
}

impl WindowEventSource for X11Platform {
    fn listen(&self, sink: EventSink, stop: &StopSignal) -> Result<(), PlatformError> {
        self.conn
            .change_window_attributes(
                self.root,
                &ChangeWindowAttributesAux::new().event_mask(EventMask::PROPERTY_CHANGE),
            )?
            .check()?;

        let conn = Arc::clone(&self.conn);
        let wake_window = self.wake_window;
        let wake_atom = self.atoms.wake;
        stop.on_request(move || Self::request_wake(&conn, wake_window, wake_atom));

        info!("Listening for _NET_ACTIVE_WINDOW changes");

        while !stop.is_requested() {
            match self.conn.wait_for_event()? {
                Event::PropertyNotify(event)
                    if event.window == self.root
                        && event.atom == self.atoms.net_active_window =>
                {
                    let Some(window) = self.foreground_window() else {
                        continue;
                    };
                    if !sink.push(window) {
                        debug!("Event queue closed, leaving X11 loop");
                        break;
                    }
                }
                Event::ClientMessage(event)
                    if event.window == self.wake_window && event.type_ == self.atoms.wake =>
                {
                    break;
                }
                _ => {}
            }
        }

        info!("X11 listener stopped");
        Ok(())
    }
}
