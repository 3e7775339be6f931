//! AmpliPi touch panel firmware - ESP32-S3 with ILI9341 + XPT2046
//!
//! Environment variables required:
//! - WIFI_SSID: WiFi network name
//! - WIFI_PASS: WiFi password
//!
//! Optional:
//! - AMPLIPI_PORT: HTTP port of the AmpliPi API (default 80)
//! - FIRMWARE_PATH: where the About screen fetches updates from

#![no_std]
#![no_main]

use core::cell::RefCell;

use amplipi_panel::config;
use amplipi_panel::controller::{DEFAULT_FIRMWARE_PATH, Flow, Panel, PanelSettings};
use amplipi_panel::host::HostTarget;
use amplipi_panel::layout::Layout;
use amplipi_panel::state::{ControllerState, VERSION};
use amplipi_panel::touch::load_calibration;
use amplipi_panel_firmware::canvas::LcdCanvas;
use amplipi_panel_firmware::http::HttpTransport;
use amplipi_panel_firmware::net::{resolve_host, wait_for_ip};
use amplipi_panel_firmware::ota::OtaFlash;
use amplipi_panel_firmware::storage::SdStorage;
use amplipi_panel_firmware::touch::{Xpt2046, calibrate};
use embassy_executor::Spawner;
use embassy_net::{Runner, Stack, StackResources};
use embassy_time::{Delay, Duration, Instant, Timer};
use embedded_hal_bus::spi::{ExclusiveDevice, RefCellDevice};
use esp_alloc as _;
use esp_backtrace as _;
use esp_hal::{
    Blocking,
    clock::CpuClock,
    gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull},
    ram,
    rng::Rng,
    spi::{
        Mode,
        master::{Config as SpiConfig, Spi},
    },
    time::Rate,
    timer::timg::TimerGroup,
};
use esp_println::println;
use esp_radio::{
    Controller,
    wifi::{ClientConfig, Config as WifiConfig, ModeConfig, WifiController, WifiDevice},
};
use esp_storage::FlashStorage;
use log::warn;
use mipidsi::{
    Builder,
    interface::SpiInterface,
    models::ILI9341Rgb565,
    options::{ColorOrder, Orientation, Rotation},
};

esp_bootloader_esp_idf::esp_app_desc!();

// When you are okay with using a nightly compiler it's better to use https://docs.rs/static_cell/2.1.0/static_cell/macro.make_static.html
macro_rules! mk_static {
    ($t:ty,$val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        #[deny(unused_attributes)]
        let x = STATIC_CELL.uninit().write(($val));
        x
    }};
}

const SSID: &str = env!("WIFI_SSID");
const PASSWORD: &str = env!("WIFI_PASS");
const AMPLIPI_PORT: Option<&str> = option_env!("AMPLIPI_PORT");
const FIRMWARE_PATH: Option<&str> = option_env!("FIRMWARE_PATH");

/// DHCP hostname, so the panel is easy to spot in the router's lease table
const HOSTNAME: &str = "APCT";

/// Pause between controller ticks when nothing happened
const TICK_INTERVAL: Duration = Duration::from_millis(20);

#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    esp_println::logger::init_logger_from_env();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    println!("AmpliPi panel {}", VERSION);

    // Internal RAM for small allocations, PSRAM for album art and socket buffers
    esp_alloc::heap_allocator!(#[ram(reclaimed)] size: 64 * 1024);
    esp_alloc::psram_allocator!(&peripherals.PSRAM, esp_hal::psram);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(
        timg0.timer0,
        #[cfg(target_arch = "riscv32")]
        esp_hal::interrupt::software::SoftwareInterruptControl::new(peripherals.SW_INTERRUPT)
            .software_interrupt0,
    );

    // ==================== SD Card + Touch (shared SPI2) ====================
    // SCK=GPIO39, MOSI=GPIO41, MISO=GPIO40, SD CS=GPIO38, touch CS=GPIO1, PENIRQ=GPIO2
    // The XPT2046 tops out around 2.5MHz, so the whole bus runs at 2MHz.
    let shared_spi = Spi::new(
        peripherals.SPI2,
        SpiConfig::default()
            .with_frequency(Rate::from_mhz(2))
            .with_mode(Mode::_0),
    )
    .expect("SPI2 init failed")
    .with_sck(peripherals.GPIO39)
    .with_mosi(peripherals.GPIO41)
    .with_miso(peripherals.GPIO40);
    let shared_spi = mk_static!(RefCell<Spi<'static, Blocking>>, RefCell::new(shared_spi));

    let sd_cs = Output::new(peripherals.GPIO38, Level::High, OutputConfig::default());
    let sd_device = RefCellDevice::new_no_delay(shared_spi, sd_cs).unwrap();
    let mut storage = SdStorage::new(sd_device, Delay);

    let touch_cs = Output::new(peripherals.GPIO1, Level::High, OutputConfig::default());
    let touch_device = RefCellDevice::new_no_delay(shared_spi, touch_cs).unwrap();
    let touch_irq = Input::new(peripherals.GPIO2, InputConfig::default().with_pull(Pull::Up));

    let panel_config = config::load_or_default(&mut storage);
    println!("Config: host={} zone1={} zone2={} source={}",
        panel_config.host, panel_config.zone1, panel_config.zone2, panel_config.source);

    // ==================== Display (SPI3) ====================
    // SCK=GPIO12, MOSI=GPIO11, CS=GPIO10, DC=GPIO9, RST=GPIO8, BL=GPIO7
    let display_spi = Spi::new(
        peripherals.SPI3,
        SpiConfig::default()
            .with_frequency(Rate::from_mhz(40))
            .with_mode(Mode::_0),
    )
    .expect("SPI3 init failed")
    .with_sck(peripherals.GPIO12)
    .with_mosi(peripherals.GPIO11);

    let display_cs = Output::new(peripherals.GPIO10, Level::High, OutputConfig::default());
    let display_device = ExclusiveDevice::new_no_delay(display_spi, display_cs).unwrap();
    let dc = Output::new(peripherals.GPIO9, Level::Low, OutputConfig::default());
    let rst = Output::new(peripherals.GPIO8, Level::High, OutputConfig::default());
    let backlight = Output::new(peripherals.GPIO7, Level::Low, OutputConfig::default());

    let di_buffer = mk_static!([u8; 512], [0u8; 512]);
    let di = SpiInterface::new(display_device, dc, di_buffer);

    let rotation = if panel_config.screen_rotation == 2 {
        Rotation::Deg180
    } else {
        Rotation::Deg0
    };
    let layout = Layout::default();
    let mut delay = esp_hal::delay::Delay::new();
    let display = Builder::new(ILI9341Rgb565, di)
        .reset_pin(rst)
        .display_size(layout.width as u16, layout.height as u16)
        .color_order(ColorOrder::Bgr)
        .orientation(Orientation::new().rotate(rotation))
        .init(&mut delay)
        .expect("Display init failed");
    let mut canvas = LcdCanvas::new(display, backlight, layout);

    // ==================== Touch calibration ====================
    let mut touch = Xpt2046::new(touch_device, touch_irq, layout);
    match load_calibration(&mut storage) {
        Some(cal) => touch.set_calibration(cal),
        None => {
            println!("No touch calibration stored, calibrating");
            if let Err(e) = calibrate(&mut touch, &mut canvas, &mut storage).await {
                warn!("Calibration screen failed: {:?}", e);
            }
        }
    }

    // ==================== WiFi ====================
    let _ = canvas.show_message(&["Connecting to WiFi", SSID]);

    let rng = Rng::new();
    let radio = mk_static!(Controller<'static>, esp_radio::init().unwrap());
    let (mut wifi_controller, ifaces) =
        esp_radio::wifi::new(radio, peripherals.WIFI, WifiConfig::default()).unwrap();

    let mut dhcp = embassy_net::DhcpConfig::default();
    dhcp.hostname = HOSTNAME.try_into().ok();
    let net_config = embassy_net::Config::dhcpv4(dhcp);
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;
    let (stack, runner) = embassy_net::new(
        ifaces.sta,
        net_config,
        mk_static!(StackResources<3>, StackResources::<3>::new()),
        seed,
    );
    let stack = mk_static!(Stack<'static>, stack);
    spawner.spawn(net_task(runner)).ok();

    wifi_connect(&mut wifi_controller).await;
    wait_for_ip(*stack).await;

    // ==================== AmpliPi ====================
    let target = HostTarget::classify(&panel_config.host);
    let _ = canvas.show_message(&["Looking for AmpliPi", target.label()]);
    let address = resolve_host(*stack, target).await;
    let port = AMPLIPI_PORT.and_then(|p| p.parse().ok()).unwrap_or(80);
    println!("AmpliPi at {}:{}", address, port);

    let transport = HttpTransport::new(*stack, &panel_config.host, (address, port));

    let mut updater = OtaFlash::new(FlashStorage::new(peripherals.FLASH));
    updater.mark_running_valid();

    let settings = PanelSettings {
        firmware_path: FIRMWARE_PATH.unwrap_or(DEFAULT_FIRMWARE_PATH),
        ..PanelSettings::default()
    };
    let debounce = Duration::from_millis(settings.debounce_ms);
    let state = ControllerState::new(panel_config, layout);
    let mut panel = Panel::new(state, transport, storage, updater, settings);

    // ==================== Main loop ====================
    loop {
        let now = Instant::now().as_millis();
        match panel.tick(now, &mut touch, &mut canvas).await {
            Ok(report) if report.flow == Flow::Restart => {
                println!("Restarting...");
                Timer::after(Duration::from_millis(100)).await;
                esp_hal::system::software_reset();
            }
            Ok(report) if report.action.is_some() => {
                Timer::after(debounce).await;
                continue;
            }
            Ok(_) => {}
            Err(e) => warn!("Display error: {:?}", e),
        }
        Timer::after(TICK_INTERVAL).await;
    }
}

/// Connect to WiFi network
async fn wifi_connect(controller: &mut WifiController<'static>) {
    if !matches!(controller.is_started(), Ok(true)) {
        let client_config = ModeConfig::Client(
            ClientConfig::default()
                .with_ssid(SSID.into())
                .with_password(PASSWORD.into()),
        );
        controller.set_config(&client_config).unwrap();
        println!("Starting WiFi...");
        controller.start_async().await.unwrap();
        println!("WiFi started!");
    }

    println!("Connecting to {}...", SSID);
    loop {
        match controller.connect_async().await {
            Ok(_) => {
                println!("WiFi connected!");
                break;
            }
            Err(e) => {
                println!("Failed to connect: {e:?}, retrying...");
                Timer::after(Duration::from_secs(5)).await;
            }
        }
    }
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}
