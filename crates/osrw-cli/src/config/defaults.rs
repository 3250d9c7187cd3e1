pub struct DefaultsConfig {
    pub temperature: f64,
    pub time_step: f64,
    pub steps: u64,
    pub walkers: usize,
    pub diffusion: f64,
    pub k0: f64,
    pub k1: f64,
    pub offset: f64,
    pub initial_lambda: f64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            temperature: 298.15,
            time_step: 1.0,
            steps: 10_000,
            walkers: 1,
            diffusion: 1.0,
            k0: 1.0,
            k1: 4.0,
            offset: 2.0,
            initial_lambda: 0.5,
        }
    }
}
