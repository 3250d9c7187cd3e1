use osrw::core::model::HarmonicLambdaModel;
use osrw::engine::config::OsrwConfig;
use osrw::workflows::walk::WalkSettings;

pub struct AppConfig {
    pub osrw: OsrwConfig,
    pub walk: WalkSettings,
    pub model: HarmonicLambdaModel,
}
