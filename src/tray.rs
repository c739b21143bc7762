//! System tray host: hidden message window, tray icon, mode menu and the
//! 50 ms poll timer that drives the dispatcher.
//!
//! Timer ticks and menu commands both arrive through this thread's message
//! loop, so the mode selector is only ever touched by one thread and needs no
//! lock.

use anyhow::{Context, Result, anyhow};
use std::cell::RefCell;
use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use windows::Win32::Foundation::{
    CloseHandle, ERROR_ALREADY_EXISTS, GetLastError, HANDLE, HWND, LPARAM, LRESULT, POINT, WPARAM,
};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Threading::CreateMutexW;
use windows::Win32::UI::HiDpi::{
    DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2, SetProcessDpiAwarenessContext,
};
use windows::Win32::UI::Shell::{
    NIF_ICON, NIF_MESSAGE, NIF_TIP, NIM_ADD, NIM_DELETE, NOTIFYICONDATAW, ShellExecuteW,
    Shell_NotifyIconW,
};
use windows::Win32::UI::WindowsAndMessaging::{
    AppendMenuW, CS_HREDRAW, CS_VREDRAW, CW_USEDEFAULT, CreatePopupMenu, CreateWindowExW,
    DefWindowProcW, DestroyMenu, DestroyWindow, DispatchMessageW, GetCursorPos, GetMessageW,
    IDI_APPLICATION, KillTimer, LoadIconW, MF_CHECKED, MF_SEPARATOR, MF_STRING, MF_UNCHECKED, MSG,
    PostQuitMessage, RegisterClassW, SW_SHOWNORMAL, SetForegroundWindow, SetTimer, TPM_BOTTOMALIGN,
    TPM_LEFTALIGN, TPM_RIGHTBUTTON, TrackPopupMenu, TranslateMessage, WM_COMMAND, WM_DESTROY,
    WM_RBUTTONUP, WM_TIMER, WM_USER, WNDCLASSW, WS_OVERLAPPEDWINDOW,
};
use windows::core::{PCWSTR, w};

use crate::capture::{ForegroundWindowLocator, GdiCapturer};
use crate::config::AppConfig;
use crate::dispatcher::Dispatcher;
use crate::input::KeyStateProbe;
use crate::mode::{CaptureMode, ModeSelector};
use crate::output::SystemClipboard;
use crate::paths;

const POLL_TIMER_ID: usize = 1;
const POLL_INTERVAL_MS: u32 = 50;
const WM_TRAYICON: u32 = WM_USER + 1;

// Menu item IDs
const MENU_CLIPBOARD: usize = 1001;
const MENU_SAVE: usize = 1002;
const MENU_OPEN_FOLDER: usize = 1003;
const MENU_EXIT: usize = 1004;

const TRAY_TIP: &str = "Hold left + right click to capture the active window";

fn menu_id(mode: CaptureMode) -> usize {
    match mode {
        CaptureMode::ClipboardCopy => MENU_CLIPBOARD,
        CaptureMode::FileSave => MENU_SAVE,
    }
}

/// Null-terminated UTF-16 copy of `s`.
fn to_wide(s: impl AsRef<OsStr>) -> Vec<u16> {
    s.as_ref().encode_wide().chain(std::iter::once(0)).collect()
}

type Win32Dispatcher =
    Dispatcher<KeyStateProbe, ForegroundWindowLocator, GdiCapturer, SystemClipboard>;

/// State owned by the UI thread for the lifetime of the tray icon.
struct TrayApp {
    modes: ModeSelector,
    dispatcher: Win32Dispatcher,
}

impl TrayApp {
    fn new(initial_mode: CaptureMode, output_dir: PathBuf) -> Self {
        Self {
            modes: ModeSelector::new(initial_mode),
            dispatcher: Dispatcher::new(
                KeyStateProbe,
                ForegroundWindowLocator,
                GdiCapturer,
                SystemClipboard,
                output_dir,
            ),
        }
    }
}

thread_local! {
    static APP: RefCell<Option<TrayApp>> = const { RefCell::new(None) };
}

/// Named mutex held for the process lifetime; closed on drop.
struct InstanceGuard(HANDLE);

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

/// Returns `None` if another instance already holds the mutex.
fn acquire_single_instance() -> Result<Option<InstanceGuard>> {
    unsafe {
        let handle = CreateMutexW(None, false, w!("ClickCapture.SingleInstance"))
            .context("Failed to create instance mutex")?;
        if GetLastError() == ERROR_ALREADY_EXISTS {
            let _ = CloseHandle(handle);
            return Ok(None);
        }
        Ok(Some(InstanceGuard(handle)))
    }
}

/// Runs the tray application until Exit is chosen.
pub fn run(config: &AppConfig) -> Result<()> {
    let Some(_instance) = acquire_single_instance()? else {
        info!("Another instance is already running, exiting");
        return Ok(());
    };

    // Keep DWM bounds and GDI screen coordinates in the same (physical) space
    let dpi = unsafe { SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2) };
    if let Err(e) = dpi {
        warn!("Could not enable per-monitor DPI awareness: {}", e);
    }

    let output_dir = config.resolve_output_dir(paths::get_exe_dir(), paths::get_pictures_dir());
    info!("Save directory: {}", output_dir.display());
    info!("Initial mode: {}", config.default_mode);
    APP.with(|app| *app.borrow_mut() = Some(TrayApp::new(config.default_mode, output_dir)));

    let hwnd = create_message_window()?;
    if let Err(e) = add_tray_icon(hwnd) {
        unsafe {
            let _ = DestroyWindow(hwnd);
        }
        return Err(e);
    }

    unsafe {
        if SetTimer(hwnd, POLL_TIMER_ID, POLL_INTERVAL_MS, None) == 0 {
            remove_tray_icon(hwnd);
            let _ = DestroyWindow(hwnd);
            return Err(anyhow!("Failed to start poll timer"));
        }
    }

    info!("Click Capture started");

    // Message loop
    let mut msg = MSG::default();
    unsafe {
        while GetMessageW(&mut msg, HWND::default(), 0, 0).as_bool() {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }

        // Cleanup
        let _ = KillTimer(hwnd, POLL_TIMER_ID);
        remove_tray_icon(hwnd);
        let _ = DestroyWindow(hwnd);
    }

    APP.with(|app| app.borrow_mut().take());
    info!("Click Capture stopped");
    Ok(())
}

fn create_message_window() -> Result<HWND> {
    unsafe {
        let hinstance = GetModuleHandleW(None)?;
        let class_name = w!("ClickCaptureClass");

        let wc = WNDCLASSW {
            style: CS_HREDRAW | CS_VREDRAW,
            lpfnWndProc: Some(window_proc),
            hInstance: hinstance.into(),
            lpszClassName: class_name,
            ..Default::default()
        };

        let atom = RegisterClassW(&wc);
        if atom == 0 {
            return Err(anyhow!("Failed to register window class"));
        }

        let hwnd = CreateWindowExW(
            Default::default(),
            class_name,
            w!("Click Capture"),
            WS_OVERLAPPEDWINDOW,
            CW_USEDEFAULT,
            CW_USEDEFAULT,
            CW_USEDEFAULT,
            CW_USEDEFAULT,
            None,
            None,
            hinstance,
            None,
        )?;

        Ok(hwnd)
    }
}

unsafe extern "system" fn window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    unsafe {
        match msg {
            WM_TIMER if wparam.0 == POLL_TIMER_ID => {
                on_poll();
                LRESULT(0)
            }
            WM_TRAYICON => {
                let event = (lparam.0 & 0xFFFF) as u32;
                if event == WM_RBUTTONUP {
                    show_context_menu(hwnd);
                }
                LRESULT(0)
            }
            WM_COMMAND => {
                let cmd = wparam.0 & 0xFFFF;
                match cmd {
                    MENU_CLIPBOARD => on_mode_selected(CaptureMode::ClipboardCopy),
                    MENU_SAVE => on_mode_selected(CaptureMode::FileSave),
                    MENU_OPEN_FOLDER => open_save_folder(hwnd),
                    MENU_EXIT => {
                        info!("Exit requested");
                        PostQuitMessage(0);
                    }
                    _ => {}
                }
                LRESULT(0)
            }
            WM_DESTROY => {
                PostQuitMessage(0);
                LRESULT(0)
            }
            _ => DefWindowProcW(hwnd, msg, wparam, lparam),
        }
    }
}

/// One dispatch cycle per timer tick.
fn on_poll() {
    APP.with(|app| {
        // A modal loop (menu, shell) can deliver WM_TIMER while we are
        // already inside a handler; skip that tick rather than re-enter.
        let Ok(mut app) = app.try_borrow_mut() else {
            debug!("Poll tick skipped, previous handler still running");
            return;
        };
        if let Some(app) = app.as_mut() {
            app.dispatcher.tick(&app.modes);
        }
    });
}

fn on_mode_selected(mode: CaptureMode) {
    APP.with(|app| {
        let Ok(mut app) = app.try_borrow_mut() else {
            warn!("Mode change to {} dropped, state busy", mode);
            return;
        };
        if let Some(app) = app.as_mut() {
            app.modes.select(mode);
        }
    });
}

/// Snapshot of the mode selection for drawing the menu.
fn current_modes() -> ModeSelector {
    APP.with(|app| {
        app.try_borrow()
            .ok()
            .and_then(|app| app.as_ref().map(|app| app.modes.clone()))
            .unwrap_or_default()
    })
}

fn current_output_dir() -> Option<PathBuf> {
    APP.with(|app| {
        let app = app.try_borrow().ok()?;
        app.as_ref().map(|app| app.dispatcher.output_dir().to_path_buf())
    })
}

fn open_save_folder(hwnd: HWND) {
    let Some(dir) = current_output_dir() else {
        return;
    };
    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!("Failed to create {}: {}", dir.display(), e);
        return;
    }

    let dir_wide = to_wide(&dir);
    let result = unsafe {
        ShellExecuteW(
            hwnd,
            w!("open"),
            PCWSTR(dir_wide.as_ptr()),
            PCWSTR::null(),
            PCWSTR::null(),
            SW_SHOWNORMAL,
        )
    };
    // Values above 32 indicate success
    if result.0 as isize <= 32 {
        warn!("Failed to open {} (code {})", dir.display(), result.0 as isize);
    }
}

fn add_tray_icon(hwnd: HWND) -> Result<()> {
    unsafe {
        let mut nid = NOTIFYICONDATAW {
            cbSize: std::mem::size_of::<NOTIFYICONDATAW>() as u32,
            hWnd: hwnd,
            uID: 1,
            uFlags: NIF_ICON | NIF_MESSAGE | NIF_TIP,
            uCallbackMessage: WM_TRAYICON,
            hIcon: LoadIconW(None, IDI_APPLICATION)?,
            ..Default::default()
        };

        let tip_wide = to_wide(TRAY_TIP);
        let len = tip_wide.len().min(nid.szTip.len());
        nid.szTip[..len].copy_from_slice(&tip_wide[..len]);

        if !Shell_NotifyIconW(NIM_ADD, &nid).as_bool() {
            return Err(anyhow!("Failed to add tray icon"));
        }

        Ok(())
    }
}

fn remove_tray_icon(hwnd: HWND) {
    unsafe {
        let nid = NOTIFYICONDATAW {
            cbSize: std::mem::size_of::<NOTIFYICONDATAW>() as u32,
            hWnd: hwnd,
            uID: 1,
            ..Default::default()
        };
        let _ = Shell_NotifyIconW(NIM_DELETE, &nid);
    }
}

fn show_context_menu(hwnd: HWND) {
    let modes = current_modes();

    unsafe {
        let menu = match CreatePopupMenu() {
            Ok(menu) => menu,
            Err(e) => {
                warn!("Failed to create tray menu: {}", e);
                return;
            }
        };

        // Mode items behave as a radio group
        for mode in CaptureMode::ALL {
            let check = if modes.is_selected(mode) {
                MF_CHECKED
            } else {
                MF_UNCHECKED
            };
            let label = to_wide(mode.label());
            let _ = AppendMenuW(menu, MF_STRING | check, menu_id(mode), PCWSTR(label.as_ptr()));
        }
        let _ = AppendMenuW(menu, MF_STRING, MENU_OPEN_FOLDER, w!("Open save folder"));
        let _ = AppendMenuW(menu, MF_SEPARATOR, 0, None);
        let _ = AppendMenuW(menu, MF_STRING, MENU_EXIT, w!("Exit"));

        let mut pt = POINT::default();
        let _ = GetCursorPos(&mut pt);

        // Required for the menu to close when clicking elsewhere
        let _ = SetForegroundWindow(hwnd);

        let _ = TrackPopupMenu(
            menu,
            TPM_BOTTOMALIGN | TPM_LEFTALIGN | TPM_RIGHTBUTTON,
            pt.x,
            pt.y,
            0,
            hwnd,
            None,
        );

        let _ = DestroyMenu(menu);
    }
}
