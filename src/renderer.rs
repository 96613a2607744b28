use crate::config::RendererConfig;
use crate::engine::supervisor::{EngineLaunch, EngineState, EngineSupervisor};
use crate::foundation::error::{MiiError, MiiResult};
use crate::protocol::identity::MiiIdentity;
use crate::protocol::request::encode;
use crate::protocol::response::{RgbaFrame, decode_response};
use crate::protocol::settings::{RenderSettings, ResponseFormat};
use crate::transport::channel::RenderChannel;
use std::path::Path;

/// Renders characters through a supervised engine.
///
/// One transaction is in flight at a time (`render*` take `&mut self`). The engine is started on
/// first use when `auto_start` is set, and liveness is re-checked before every render. Dropping
/// the renderer closes it, stopping any engine it launched.
#[derive(Debug)]
pub struct Renderer {
    auto_start: bool,
    supervisor: EngineSupervisor,
    channel: RenderChannel,
    span: tracing::Span,
    closed: bool,
}

impl Renderer {
    /// Build a renderer logging under a `renderer` span of the current span.
    pub fn new(config: RendererConfig) -> MiiResult<Self> {
        let span = tracing::info_span!("renderer", port = config.port);
        Self::with_span(config, span)
    }

    /// Build a renderer logging under `span`.
    ///
    /// Validates the engine paths; no process is spawned here.
    pub fn with_span(config: RendererConfig, span: tracing::Span) -> MiiResult<Self> {
        let launch = EngineLaunch::new(&config.executable, &config.working_dir)?
            .with_args(config.extra_args.iter().cloned());
        let supervisor = EngineSupervisor::new(
            launch,
            config.supervisor_opts(),
            tracing::info_span!(parent: &span, "engine"),
        );
        let channel = RenderChannel::new(
            config.port,
            config.channel_timeouts(),
            tracing::debug_span!(parent: &span, "channel"),
        );
        Ok(Self {
            auto_start: config.auto_start,
            supervisor,
            channel,
            span,
            closed: false,
        })
    }

    /// Start the engine now instead of on the first render.
    pub fn start(&mut self) -> MiiResult<()> {
        self.check_open()?;
        self.supervisor.start()
    }

    /// `true` when the engine port accepts connections.
    pub fn is_running(&self) -> bool {
        self.supervisor.is_running()
    }

    /// OS process id of the engine this renderer launched, if any.
    pub fn pid(&self) -> Option<u32> {
        self.supervisor.pid()
    }

    /// Refreshed engine state.
    pub fn state(&mut self) -> EngineState {
        self.supervisor.poll()
    }

    /// Render at the resolution the settings request.
    pub fn render(
        &mut self,
        identity: &MiiIdentity,
        settings: &RenderSettings,
    ) -> MiiResult<RgbaFrame> {
        self.render_sized(identity, settings, settings.resolution)
    }

    /// Render, then resample to `output_size × output_size` if the engine returned another size.
    ///
    /// Combined with [`RenderSettings::with_zoom`], this separates camera distance from the
    /// final image size.
    pub fn render_sized(
        &mut self,
        identity: &MiiIdentity,
        settings: &RenderSettings,
        output_size: u32,
    ) -> MiiResult<RgbaFrame> {
        if settings.response_format == ResponseFormat::Gltf {
            return Err(MiiError::validation(
                "gltf responses carry a model, not pixels; use Renderer::export",
            ));
        }
        if output_size == 0 {
            return Err(MiiError::validation("output size must be non-zero"));
        }
        let reply = self.transact(identity, settings)?;
        decode_response(&reply, settings.response_format, output_size)
    }

    /// Render and save the frame as a PNG at `path`.
    pub fn render_to_file(
        &mut self,
        identity: &MiiIdentity,
        settings: &RenderSettings,
        output_size: u32,
        path: impl AsRef<Path>,
    ) -> MiiResult<RgbaFrame> {
        let frame = self.render_sized(identity, settings, output_size)?;
        frame.save_png(path)?;
        Ok(frame)
    }

    /// Fetch a container reply (`Gltf` or `Image`) byte-for-byte, without decoding it.
    pub fn export(
        &mut self,
        identity: &MiiIdentity,
        settings: &RenderSettings,
    ) -> MiiResult<Vec<u8>> {
        if !settings.response_format.is_container() {
            return Err(MiiError::validation(
                "export needs a container response format (gltf or image)",
            ));
        }
        self.transact(identity, settings)
    }

    /// Render a sequence of frames that share an identity and evolving settings.
    pub fn animate(
        &mut self,
        identity: &MiiIdentity,
        settings: RenderSettings,
        output_size: u32,
    ) -> Animation<'_> {
        Animation {
            renderer: self,
            identity: *identity,
            settings,
            output_size,
        }
    }

    /// Stop the engine this renderer launched. Idempotent.
    ///
    /// A closed renderer rejects further renders.
    pub fn close(&mut self) -> MiiResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.supervisor.stop()
    }

    fn check_open(&self) -> MiiResult<()> {
        if self.closed {
            return Err(MiiError::validation("renderer has been closed"));
        }
        Ok(())
    }

    fn ensure_running(&mut self) -> MiiResult<()> {
        self.check_open()?;
        if self.auto_start {
            return self.supervisor.start();
        }
        if self.supervisor.is_running() {
            return Ok(());
        }
        let state = self.supervisor.poll();
        Err(MiiError::connection(format!(
            "engine not listening on port {} (state {state:?}) and auto_start is disabled",
            self.supervisor.port()
        )))
    }

    fn transact(
        &mut self,
        identity: &MiiIdentity,
        settings: &RenderSettings,
    ) -> MiiResult<Vec<u8>> {
        self.ensure_running()?;

        let packet = encode(identity, settings);
        let result = self
            .channel
            .transact(&packet, settings.response_format.into());
        if let Err(e) = &result {
            let _enter = self.span.enter();
            tracing::warn!(error = %e, "render transaction failed");
            if matches!(e, MiiError::Connection(_)) {
                self.supervisor.observe_refused();
            }
        }
        result
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            let _enter = self.span.enter();
            tracing::warn!(error = %e, "failed to close renderer");
        }
    }
}

/// Frame-by-frame rendering with settings carried between frames.
pub struct Animation<'r> {
    renderer: &'r mut Renderer,
    identity: MiiIdentity,
    settings: RenderSettings,
    output_size: u32,
}

impl Animation<'_> {
    /// Settings the next frame starts from.
    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Apply `change` to the carried settings, then render one frame.
    ///
    /// Changes persist into later frames.
    pub fn frame(&mut self, change: impl FnOnce(&mut RenderSettings)) -> MiiResult<RgbaFrame> {
        change(&mut self.settings);
        self.renderer
            .render_sized(&self.identity, &self.settings, self.output_size)
    }
}
