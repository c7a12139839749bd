#![allow(unsafe_code, reason = "Win32 hooks and process queries are only reachable through FFI")]

use super::{EventSink, IdleProbe, ProcessResolver, StopSignal, WindowEventSource};
use crate::app_names::AppNameTable;
use crate::constants::UNKNOWN_APP;
use crate::error::PlatformError;
use crate::models::WindowHandle;
use log::{debug, info, warn};
use std::cell::RefCell;
use std::ffi::c_void;
use std::sync::Arc;
use windows::core::PWSTR;
use windows::Win32::Foundation::{CloseHandle, HMODULE, HWND, LPARAM, WPARAM};
use windows::Win32::System::SystemInformation::GetTickCount;
use windows::Win32::System::Threading::{
    GetCurrentThreadId, OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
    PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows::Win32::UI::Accessibility::{SetWinEventHook, UnhookWinEvent, HWINEVENTHOOK};
use windows::Win32::UI::Input::KeyboardAndMouse::{GetLastInputInfo, LASTINPUTINFO};
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, GetForegroundWindow, GetMessageW, GetWindowThreadProcessId, PeekMessageW,
    PostThreadMessageW, TranslateMessage, EVENT_SYSTEM_FOREGROUND, MSG, PM_NOREMOVE,
    WINEVENT_OUTOFCONTEXT, WINEVENT_SKIPOWNPROCESS, WM_QUIT, WM_USER,
};

thread_local! {
    // Out-of-context WinEvent callbacks run on the thread that installed the
    // hook, so the sink only has to live on the listener thread.
    static SINK: RefCell<Option<EventSink>> = const { RefCell::new(None) };
}

/// Win32 backend: `EVENT_SYSTEM_FOREGROUND` hook, executable-name identities and
/// `GetLastInputInfo` idle time.
pub struct WindowsPlatform {
    names: Arc<AppNameTable>,
}

impl WindowsPlatform {
    pub fn new(names: Arc<AppNameTable>) -> Self {
        Self { names }
    }

    fn executable_name(hwnd: HWND) -> Option<String> {
        let mut process_id: u32 = 0;
        unsafe {
            GetWindowThreadProcessId(hwnd, Some(&mut process_id));
        }
        if process_id == 0 {
            return None;
        }

        let process = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, process_id) }
            .map_err(|e| debug!("OpenProcess({process_id}) failed: {e}"))
            .ok()?;

        let mut exe_path = [0u16; 512];
        let mut size = u32::try_from(exe_path.len()).unwrap_or(u32::MAX);
        let queried = unsafe {
            QueryFullProcessImageNameW(
                process,
                PROCESS_NAME_WIN32,
                PWSTR(exe_path.as_mut_ptr()),
                &mut size,
            )
        };
        unsafe {
            let _ = CloseHandle(process);
        }
        if let Err(e) = queried {
            debug!("QueryFullProcessImageNameW({process_id}) failed: {e}");
            return None;
        }

        let len = usize::try_from(size).ok()?;
        let path = String::from_utf16_lossy(exe_path.get(..len)?);
        path.rsplit('\\').next().map(str::to_string)
    }
}

fn to_handle(hwnd: HWND) -> WindowHandle {
    #[allow(
        clippy::as_conversions,
        reason = "window handles are opaque pointer-sized values"
    )]
    let raw = hwnd.0 as usize as u64;
    WindowHandle(raw)
}

fn to_hwnd(window: WindowHandle) -> Option<HWND> {
    let raw = usize::try_from(window.0).ok()?;
    #[allow(
        clippy::as_conversions,
        reason = "window handles are opaque pointer-sized values"
    )]
    let hwnd = HWND(raw as *mut c_void);
    Some(hwnd)
}

impl ProcessResolver for WindowsPlatform {
    fn resolve(&self, window: WindowHandle) -> String {
        to_hwnd(window)
            .and_then(Self::executable_name)
            .map_or_else(|| UNKNOWN_APP.to_string(), |exe| self.names.friendly_name(&exe))
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        let hwnd = unsafe { GetForegroundWindow() };
        if hwnd.0.is_null() {
            None
        } else {
            Some(to_handle(hwnd))
        }
    }
}

impl IdleProbe for WindowsPlatform {
    fn idle_seconds(&self) -> Result<f64, PlatformError> {
        let mut info = LASTINPUTINFO {
            cbSize: u32::try_from(std::mem::size_of::<LASTINPUTINFO>())
                .map_err(|e| PlatformError::Native(e.to_string()))?,
            dwTime: 0,
        };
        let ok = unsafe { GetLastInputInfo(&mut info) };
        if !ok.as_bool() {
            return Err(PlatformError::Native("GetLastInputInfo failed".to_string()));
        }
        // Both counters wrap after ~49.7 days
        let millis = unsafe { GetTickCount() }.wrapping_sub(info.dwTime);
        Ok(f64::from(millis) / 1000.0)
    }
}

unsafe extern "system" fn foreground_event_proc(
    _hook: HWINEVENTHOOK,
    event: u32,
    hwnd: HWND,
    _id_object: i32,
    _id_child: i32,
    _event_thread: u32,
    _event_time: u32,
) {
    if event != EVENT_SYSTEM_FOREGROUND || hwnd.0.is_null() {
        return;
    }
    SINK.with(|slot| {
        if let Some(sink) = slot.borrow().as_ref() {
            sink.push(to_handle(hwnd));
        }
    });
}

impl WindowEventSource for WindowsPlatform {
    fn listen(&self, sink: EventSink, stop: &StopSignal) -> Result<(), PlatformError> {
        SINK.with(|slot| *slot.borrow_mut() = Some(sink));

        let hook = unsafe {
            SetWinEventHook(
                EVENT_SYSTEM_FOREGROUND,
                EVENT_SYSTEM_FOREGROUND,
                HMODULE::default(),
                Some(foreground_event_proc),
                0,
                0,
                WINEVENT_OUTOFCONTEXT | WINEVENT_SKIPOWNPROCESS,
            )
        };
        if hook.0.is_null() {
            SINK.with(|slot| slot.borrow_mut().take());
            return Err(PlatformError::Native(
                "SetWinEventHook(EVENT_SYSTEM_FOREGROUND) failed".to_string(),
            ));
        }

        // Make sure this thread owns a message queue before anyone posts to it
        let mut msg = MSG::default();
        unsafe {
            let _ = PeekMessageW(&mut msg, HWND::default(), WM_USER, WM_USER, PM_NOREMOVE);
        }

        let thread_id = unsafe { GetCurrentThreadId() };
        stop.on_request(move || {
            let posted = unsafe { PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) };
            if let Err(e) = posted {
                warn!("Failed to post WM_QUIT to listener thread {thread_id}: {e}");
            }
        });

        info!("Foreground hook installed on thread {thread_id}");

        loop {
            // 0 means WM_QUIT, -1 means error
            let status = unsafe { GetMessageW(&mut msg, HWND::default(), 0, 0) };
            if status.0 <= 0 {
                if status.0 < 0 {
                    warn!("GetMessageW failed, leaving message loop");
                }
                break;
            }
            unsafe {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }

        unsafe {
            let _ = UnhookWinEvent(hook);
        }
        SINK.with(|slot| slot.borrow_mut().take());
        info!("Foreground hook removed");
        Ok(())
    }
}
