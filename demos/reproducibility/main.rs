// Reproducible latents for stable diffusion.
//
// Generates a batch of initial latents with one generator per seed, then
// checks that each element can be regenerated alone from its seed, the
// recipe used to pick a good image out of a batch and refine its prompt.
// A short DDIM loop with eta > 0 is then run twice to show that the noise
// added during denoising follows the generators too. The unet is replaced by
// a fixed linear map, only the noise handling is of interest here.
//
//   cargo run --example reproducibility --features clap,tracing-subscriber -- --seeds 0 1 2
use clap::Parser;
use diffusers_noise::{
    noise::Generators,
    pipelines::{prepare_latents, LatentsConfig},
    random::{generators_from_seeds, Generator},
    schedulers::ddim,
    utils::DeviceSetup,
};
use tch::{Kind, Tensor};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// One seed per image of the batch.
    #[arg(long, num_args = 1.., default_values_t = [0u64, 1])]
    seeds: Vec<u64>,

    /// When set, use the CPU for the listed devices, can be 'all' or 'unet'.
    /// Multiple values can be set.
    #[arg(long)]
    cpu: Vec<String>,

    /// The height in pixels of the generated image.
    #[arg(long, default_value_t = 512)]
    height: i64,

    /// The width in pixels of the generated image.
    #[arg(long, default_value_t = 512)]
    width: i64,

    /// The number of steps to run the diffusion for.
    #[arg(long, default_value_t = 10)]
    n_steps: usize,

    /// The amount of noise added at each DDIM step.
    #[arg(long, default_value_t = 1.0)]
    eta: f64,
}

fn checksum(t: &Tensor) -> f64 {
    t.sum(Kind::Double).double_value(&[])
}

fn denoise(
    scheduler: &ddim::DDIMScheduler,
    latents: Tensor,
    generators: &mut [Generator],
) -> anyhow::Result<Tensor> {
    let mut latents = latents;
    for &timestep in scheduler.timesteps().iter() {
        let latent_model_input = scheduler.scale_model_input(latents.shallow_clone(), timestep);
        let noise_pred = &latent_model_input * 0.5;
        latents =
            scheduler.step(&noise_pred, timestep, &latents, Generators::Batched(generators))?;
    }
    Ok(latents)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let Args { seeds, cpu, height, width, n_steps, eta } = Args::parse();
    tch::maybe_init_cuda();
    let devices = DeviceSetup::new(cpu);
    let unet_device = devices.get("unet");
    info!(?unet_device, cuda = tch::Cuda::is_available(), "devices");

    let config = LatentsConfig::default();
    let scheduler_config = ddim::DDIMSchedulerConfig { eta, ..Default::default() };
    let scheduler = ddim::DDIMScheduler::new(n_steps, scheduler_config)?;
    let batch_size = seeds.len() as i64;

    // Sampling happens on the cpu whatever the unet device.
    let mut generators = generators_from_seeds(&seeds, tch::Device::Cpu);
    let latents = prepare_latents(
        &config,
        batch_size,
        height,
        width,
        Kind::Float,
        unet_device,
        (&mut generators).into(),
        None,
        scheduler.init_noise_sigma(),
    )?;
    info!(shape = ?latents.size(), "generated the batch latents");

    for (idx, &seed) in seeds.iter().enumerate() {
        let mut generator = Generator::cpu().with_seed(seed);
        let single = prepare_latents(
            &config,
            1,
            height,
            width,
            Kind::Float,
            unet_device,
            (&mut generator).into(),
            None,
            scheduler.init_noise_sigma(),
        )?;
        let element = latents.narrow(0, idx as i64, 1);
        println!(
            "seed {seed}: batch element checksum {:.6}, standalone {:.6}, identical: {}",
            checksum(&element),
            checksum(&single),
            element.equal(&single)
        );
    }

    let mut first = generators_from_seeds(&seeds, tch::Device::Cpu);
    let mut second = generators_from_seeds(&seeds, tch::Device::Cpu);
    let _no_grad_guard = tch::no_grad_guard();
    let run1 = denoise(&scheduler, latents.shallow_clone(), &mut first)?;
    let run2 = denoise(&scheduler, latents, &mut second)?;
    println!(
        "denoised twice with eta {eta}: checksums {:.6} / {:.6}, identical: {}",
        checksum(&run1),
        checksum(&run2),
        run1.equal(&run2)
    );
    Ok(())
}
