use std::{
    ffi::OsString,
    io,
    path::Path,
    process::Command,
    sync::{Mutex, OnceLock},
    time::Duration,
};

use tracing::error;
use windows::Win32::Foundation::ERROR_INVALID_PARAMETER;
use windows::Win32::System::Console::{AllocConsole, CTRL_BREAK_EVENT, GenerateConsoleCtrlEvent};
use windows_service::{
    define_windows_service,
    service::{
        ServiceControl, ServiceControlAccept, ServiceExitCode, ServiceState, ServiceStatus,
        ServiceType,
    },
    service_control_handler::{self, ServiceControlHandlerResult},
    service_dispatcher,
};

use crate::{error::SupervisorError, supervisor::Supervisor};

/// `taskkill` reports this exit code when the target process is already gone,
/// e.g. after Ctrl+C in the console killed the whole group.
const TASKKILL_NOT_FOUND: i32 = 128;

/// `sc stop` reports this exit code when the service is not running.
const SERVICE_NOT_ACTIVE: i32 = 1062;

/// Detaches the child from the supervisor's console signal group.
pub fn new_process_group(command: &mut Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    command.creation_flags(CREATE_NEW_PROCESS_GROUP);
}

/// Sends `CTRL_BREAK` to the child's console process group.
pub fn terminate_process(pid: u32) -> io::Result<()> {
    match unsafe { GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, pid) } {
        Ok(()) => Ok(()),
        // The child won the race and exited before the event was delivered.
        Err(err) if err.code() == ERROR_INVALID_PARAMETER.to_hresult() => Ok(()),
        Err(err) => Err(io::Error::other(err)),
    }
}

/// Force-stops the whole process tree rooted at `pid` via `taskkill`.
pub fn terminate_tree(pid: u32) -> io::Result<()> {
    let status = Command::new("taskkill")
        .args(["/f", "/t", "/pid", &pid.to_string()])
        .status()?;
    match status.code() {
        Some(0) | Some(TASKKILL_NOT_FOUND) | None => Ok(()),
        Some(code) => Err(io::Error::other(format!(
            "taskkill exited with code {code}"
        ))),
    }
}

/// Windows needs no file attribute to execute a binary.
pub fn set_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Restarts an installed service: `sc stop <name>` (a not-running service is
/// fine) followed by `sc start <name>`.
pub fn restart_service(name: &str) -> io::Result<()> {
    let status = Command::new("sc").args(["stop", name]).status()?;
    match status.code() {
        Some(0) | Some(SERVICE_NOT_ACTIVE) | None => {}
        Some(code) => {
            return Err(io::Error::other(format!("sc stop exited with code {code}")));
        }
    }

    let status = Command::new("sc").args(["start", name]).status()?;
    if !status.success() {
        return Err(io::Error::other(format!("sc start exited with {status}")));
    }
    Ok(())
}

struct ServiceSlot {
    name: String,
    supervisor: Mutex<Option<Supervisor>>,
}

static SERVICE: OnceLock<ServiceSlot> = OnceLock::new();

define_windows_service!(ffi_service_main, service_main);

/// Hands the engine to the service control manager and blocks until the
/// service stops. The SCM start callback allocates a console (console-break
/// child termination needs one) and then runs the engine; the stop callback
/// cancels the engine token.
pub fn run_service(name: &str, supervisor: Supervisor) -> Result<(), SupervisorError> {
    let slot = ServiceSlot {
        name: name.to_string(),
        supervisor: Mutex::new(Some(supervisor)),
    };
    if SERVICE.set(slot).is_err() {
        return Err(SupervisorError::Io(io::Error::other(
            "service dispatcher already started in this process",
        )));
    }

    service_dispatcher::start(name, ffi_service_main)?;
    Ok(())
}

fn service_main(_arguments: Vec<OsString>) {
    if let Err(err) = run_service_main() {
        error!("Service failed: {err}");
    }
}

fn run_service_main() -> Result<(), SupervisorError> {
    let slot = SERVICE.get().expect("service slot not initialized");
    let mut supervisor = slot
        .supervisor
        .lock()
        .expect("service slot poisoned")
        .take()
        .expect("service started twice");

    let cancel = supervisor.cancel_handle();
    let status_handle =
        service_control_handler::register(&slot.name, move |control| match control {
            ServiceControl::Stop => {
                cancel.cancel();
                ServiceControlHandlerResult::NoError
            }
            ServiceControl::Interrogate => ServiceControlHandlerResult::NoError,
            _ => ServiceControlHandlerResult::NotImplemented,
        })?;

    status_handle.set_service_status(service_status(ServiceState::Running))?;

    if let Err(err) = unsafe { AllocConsole() } {
        return Err(SupervisorError::Io(io::Error::other(err)));
    }

    let result = supervisor.run();

    status_handle.set_service_status(service_status(ServiceState::Stopped))?;
    result
}

fn service_status(state: ServiceState) -> ServiceStatus {
    ServiceStatus {
        service_type: ServiceType::OWN_PROCESS,
        current_state: state,
        controls_accepted: ServiceControlAccept::STOP,
        exit_code: ServiceExitCode::Win32(0),
        checkpoint: 0,
        wait_hint: Duration::default(),
        process_id: None,
    }
}
