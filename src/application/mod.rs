pub mod use_cases;

pub use use_cases::article_summary::ArticleSummaryUseCase;
pub use use_cases::calibration::CalibrationUseCase;
pub use use_cases::censorship::CensorshipUseCase;
pub use use_cases::connections::ConnectionsUseCase;
pub use use_cases::datacenters::DatacentersUseCase;
pub use use_cases::drone::{DroneNavigator, WebhookUseCase};
pub use use_cases::graph_search::LoopUseCase;
pub use use_cases::interrogation::InterrogationUseCase;
pub use use_cases::lab_research::{FineTuneUseCase, ResearchUseCase};
pub use use_cases::map_city::MapCityUseCase;
pub use use_cases::notebook::{NotebookQa, NotebookUseCase};
pub use use_cases::photos::PhotosUseCase;
pub use use_cases::poligon::PoligonUseCase;
pub use use_cases::report_categories::ReportCategoriesUseCase;
pub use use_cases::report_tags::ReportTagsUseCase;
pub use use_cases::robot_checks::{LoginUseCase, VerifyUseCase};
pub use use_cases::robot_image::RobotImageUseCase;
pub use use_cases::site_questions::SoftoUseCase;
pub use use_cases::weapons_search::WeaponsSearchUseCase;
