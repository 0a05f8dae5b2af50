// # dtwind - Sample Digital Twin Device
//
// A THIN integration layer over dtwin-core. All protocol logic lives in the
// library; this binary only wires a transport, one sample interface and the
// model definition interface together.
//
// The dtwind daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Creating the transport through the transport registry
// 4. Registering the interfaces and sending periodic telemetry
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// - `DTWIN_LOG_LEVEL`: trace, debug, info, warn, error (default info)
// - `DTWIN_CAPABILITY_MODEL_ID`: capability model announced at registration
// - `DTWIN_MODEL_DEFINITION_PATH`: definition document served for the
//   sample interface (optional)
// - `DTWIN_TELEMETRY_INTERVAL_SECS`: seconds between telemetry sends
// - `DTWIN_TRANSPORT_MODE`: threaded or cooperative (default threaded)
// - `DTWIN_ACK_LATENCY_MS`: loopback acknowledgement latency
// - `DTWIN_CLIENT_CONFIG_PATH`: JSON client configuration file (optional)
//
// ## Example
//
// ```bash
// export DTWIN_LOG_LEVEL=debug
// export DTWIN_TRANSPORT_MODE=cooperative
// export DTWIN_MODEL_DEFINITION_PATH=./sensor.json
//
// dtwind
// ```

use anyhow::{Context, Result};
use dtwin_core::{
    ASYNC_STATUS_CODE_PENDING, AsyncCommandUpdate, ClientConfig, ClientEvent, CommandResponse,
    CompletionCallback, DeviceClient, DeviceClientLl, Error, InterfaceClient, LoopbackMode,
    ModelDefinitionClient, PropertyResponse, PropertyUpdate, STRUCT_VERSION_1, TransportBinding,
    TransportConfig, TransportRegistry,
};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

const SENSOR_INTERFACE_ID: &str = "urn:contoso:com:EnvironmentalSensor:1";
const SENSOR_COMPONENT_NAME: &str = "environmentalSensor";
const DEFAULT_CAPABILITY_MODEL_ID: &str = "urn:contoso:com:SampleDevice:1";
const DO_WORK_INTERVAL: Duration = Duration::from_millis(100);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DtwinExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DtwinExitCode> for ExitCode {
    fn from(code: DtwinExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    log_level: String,
    capability_model_id: String,
    model_definition_path: Option<PathBuf>,
    telemetry_interval_secs: u64,
    transport_mode: String,
    ack_latency_ms: u64,
    client_config_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: env::var("DTWIN_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            capability_model_id: env::var("DTWIN_CAPABILITY_MODEL_ID")
                .unwrap_or_else(|_| DEFAULT_CAPABILITY_MODEL_ID.to_string()),
            model_definition_path: env::var("DTWIN_MODEL_DEFINITION_PATH")
                .ok()
                .map(PathBuf::from),
            telemetry_interval_secs: parse_var("DTWIN_TELEMETRY_INTERVAL_SECS", 10)?,
            transport_mode: env::var("DTWIN_TRANSPORT_MODE")
                .unwrap_or_else(|_| "threaded".to_string()),
            ack_latency_ms: parse_var("DTWIN_ACK_LATENCY_MS", 0)?,
            client_config_path: env::var("DTWIN_CLIENT_CONFIG_PATH").ok().map(PathBuf::from),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "DTWIN_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        if let Err(e) = dtwin_core::interface::naming::validate_name(&self.capability_model_id, true)
        {
            anyhow::bail!(
                "DTWIN_CAPABILITY_MODEL_ID '{}' is not a valid id ({}). \
                It must start with urn: and contain only letters, digits, '_' and ':'",
                self.capability_model_id,
                e
            );
        }

        if let Some(path) = &self.model_definition_path
            && !path.is_file()
        {
            anyhow::bail!(
                "DTWIN_MODEL_DEFINITION_PATH does not point to a file: {}",
                path.display()
            );
        }

        if !(1..=3600).contains(&self.telemetry_interval_secs) {
            anyhow::bail!(
                "DTWIN_TELEMETRY_INTERVAL_SECS must be between 1 and 3600 seconds. Got: {}",
                self.telemetry_interval_secs
            );
        }

        self.loopback_mode()?;

        if self.ack_latency_ms > 60_000 {
            anyhow::bail!(
                "DTWIN_ACK_LATENCY_MS must be at most 60000. Got: {}",
                self.ack_latency_ms
            );
        }

        Ok(())
    }

    fn loopback_mode(&self) -> Result<LoopbackMode> {
        match self.transport_mode.to_lowercase().as_str() {
            "threaded" => Ok(LoopbackMode::Threaded),
            "cooperative" => Ok(LoopbackMode::Cooperative),
            _ => anyhow::bail!(
                "DTWIN_TRANSPORT_MODE '{}' is not supported. \
                Supported modes: threaded, cooperative",
                self.transport_mode
            ),
        }
    }

    fn client_config(&self) -> Result<ClientConfig> {
        match &self.client_config_path {
            Some(path) => ClientConfig::from_json_file(path)
                .with_context(|| format!("DTWIN_CLIENT_CONFIG_PATH {}", path.display())),
            None => Ok(ClientConfig::default()),
        }
    }
}

fn parse_var(name: &str, default: u64) -> Result<u64> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{} must be a whole number. Got: {}", name, value)),
        Err(_) => Ok(default),
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return DtwinExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return DtwinExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DtwinExitCode::ConfigError.into();
    }

    info!("Starting dtwind");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DtwinExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run_device(config).await {
            Ok(()) => DtwinExitCode::CleanShutdown,
            Err(e) => {
                error!("Device error: {:#}", e);
                DtwinExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Work the sample interface's callbacks hand back to the main loop
enum DeviceAction {
    AcknowledgeProperty(PropertyUpdate),
    FinishCommand {
        command_name: String,
        request_id: String,
    },
}

/// Either flavor of device handle
enum Device {
    Threaded(DeviceClient),
    Cooperative(DeviceClientLl),
}

impl Device {
    fn create(
        transport: Box<dyn TransportBinding>,
        mode: LoopbackMode,
        client_config: ClientConfig,
    ) -> dtwin_core::Result<(Self, mpsc::Receiver<ClientEvent>)> {
        match mode {
            LoopbackMode::Threaded => DeviceClient::create_with_events(transport, client_config)
                .map(|(client, events)| (Device::Threaded(client), events)),
            LoopbackMode::Cooperative => {
                DeviceClientLl::create_with_events(transport, client_config)
                    .map(|(client, events)| (Device::Cooperative(client), events))
            }
        }
    }

    fn register_interfaces(
        &self,
        capability_model_id: &str,
        interfaces: &[InterfaceClient],
    ) -> dtwin_core::Result<()> {
        let on_complete: CompletionCallback = Box::new(|status| match status {
            Ok(()) => info!("Interfaces registered"),
            Err(e) => error!("Interface registration failed: {}", e),
        });
        match self {
            Device::Threaded(client) => {
                client.register_interfaces(capability_model_id, interfaces, Some(on_complete))
            }
            Device::Cooperative(client) => {
                client.register_interfaces(capability_model_id, interfaces, Some(on_complete))
            }
        }
    }

    fn do_work(&self) {
        if let Device::Cooperative(client) = self {
            client.do_work();
        }
    }

    fn destroy(self) {
        match self {
            Device::Threaded(client) => client.destroy(),
            Device::Cooperative(client) => client.destroy(),
        }
    }
}

fn sensor_interface(
    actions: mpsc::UnboundedSender<DeviceAction>,
) -> dtwin_core::Result<InterfaceClient> {
    let sensor = InterfaceClient::new(
        SENSOR_INTERFACE_ID,
        SENSOR_COMPONENT_NAME,
        Some(Box::new(|status: dtwin_core::Result<()>| match status {
            Ok(()) => info!("Sensor interface registered"),
            Err(Error::InterfaceUnregistering) => info!("Sensor interface unregistering"),
            Err(e) => error!("Sensor interface registration failed: {}", e),
        })),
    )?;

    let property_actions = actions.clone();
    sensor.set_property_updated_callback(move |update| {
        info!(
            "Desired {} = {} (version {})",
            update.property_name, update.desired, update.desired_version
        );
        let _ = property_actions.send(DeviceAction::AcknowledgeProperty(update.clone()));
    })?;

    sensor.set_command_callback(move |request| match request.command_name.as_str() {
        "blink" => {
            info!("Blinking with {}", request.request_data);
            CommandResponse::new(200, "{\"description\":\"blinking\"}")
        }
        "turnOff" | "turnOn" => {
            info!("Handling {} asynchronously", request.command_name);
            let _ = actions.send(DeviceAction::FinishCommand {
                command_name: request.command_name.clone(),
                request_id: request.request_id.clone(),
            });
            CommandResponse::new(ASYNC_STATUS_CODE_PENDING, "{\"description\":\"started\"}")
        }
        other => {
            warn!("Unknown sensor command {}", other);
            CommandResponse::new(404, "\"Unknown command\"")
        }
    })?;

    Ok(sensor)
}

fn handle_action(sensor: &InterfaceClient, action: DeviceAction) {
    let result = match action {
        DeviceAction::AcknowledgeProperty(update) => {
            let response = PropertyResponse {
                version: STRUCT_VERSION_1,
                response_version: update.desired_version,
                status_code: 200,
                status_description: "Property updated".to_string(),
            };
            sensor.report_property(
                &update.property_name,
                &update.desired,
                Some(&response),
                Some(Box::new(|status| debug!("Property acknowledgement sent: {:?}", status))),
            )
        }
        DeviceAction::FinishCommand {
            command_name,
            request_id,
        } => sensor.update_async_command_status(&AsyncCommandUpdate {
            version: STRUCT_VERSION_1,
            command_name,
            request_id,
            property_data: "{\"description\":\"completed\"}".to_string(),
            status_code: 200,
        }),
    };

    match result {
        Ok(()) => {}
        Err(e) if e.is_lifecycle() => warn!("Sensor action skipped: {}", e),
        Err(e) => error!("Sensor action failed: {}", e),
    }
}

/// Run the device until a shutdown signal arrives
async fn run_device(config: Config) -> Result<()> {
    let registry = TransportRegistry::new();

    #[cfg(feature = "loopback")]
    {
        info!("Registering loopback transport");
        let hub = dtwin_loopback::register(&registry);
        let mut outbound = hub.subscribe();
        tokio::spawn(async move {
            use tokio_stream::StreamExt;
            while let Some(message) = outbound.next().await {
                debug!("Outbound: {:?}", message);
            }
        });
    }

    let mode = config.loopback_mode()?;
    let transport = registry
        .create_transport(&TransportConfig::Loopback {
            mode,
            ack_latency_ms: config.ack_latency_ms,
        })
        .context("Cannot create transport")?;

    let (device, mut events) = Device::create(transport, mode, config.client_config()?)
        .context("Cannot create device client")?;

    let (action_tx, mut actions) = mpsc::unbounded_channel();
    let sensor = sensor_interface(action_tx).context("Cannot create sensor interface")?;

    let model_definition = ModelDefinitionClient::new().context("Cannot create model definition")?;
    if let Some(path) = &config.model_definition_path {
        model_definition
            .publish_from_file(SENSOR_INTERFACE_ID, path)
            .with_context(|| format!("Cannot publish {}", path.display()))?;
    }

    device
        .register_interfaces(
            &config.capability_model_id,
            &[sensor.clone(), model_definition.interface().clone()],
        )
        .context("Cannot register interfaces")?;

    info!(
        "Device initialized (mode={:?}, telemetry every {}s)",
        mode, config.telemetry_interval_secs
    );

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);
    let mut telemetry = tokio::time::interval(Duration::from_secs(config.telemetry_interval_secs));
    let mut work = tokio::time::interval(DO_WORK_INTERVAL);
    let mut reading: u64 = 0;

    let outcome = loop {
        tokio::select! {
            signal = &mut shutdown => break signal,
            _ = work.tick() => device.do_work(),
            _ = telemetry.tick() => {
                reading += 1;
                let temperature = 20.0 + (reading % 10) as f64 / 2.0;
                if let Err(e) = sensor.send_telemetry(
                    "temp",
                    &temperature.to_string(),
                    Some(Box::new(|status| debug!("Telemetry confirmed: {:?}", status))),
                ) {
                    if e.is_lifecycle() || e == Error::InterfaceNotRegistered {
                        debug!("Telemetry skipped: {}", e);
                    } else {
                        warn!("Telemetry failed: {}", e);
                    }
                }
            }
            Some(action) = actions.recv() => handle_action(&sensor, action),
            Some(event) = events.recv() => info!("Client event: {:?}", event),
        }
    };

    info!("Shutting down device");
    device.destroy();
    sensor.destroy();
    model_definition.destroy();

    let signal = outcome?;
    info!("Stopped after {}", signal);
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    tokio::select! {
        _ = sigterm.recv() => Ok("SIGTERM"),
        _ = sigint.recv() => Ok("SIGINT"),
    }
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
