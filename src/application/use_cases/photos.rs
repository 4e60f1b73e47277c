//! Photo repair dialog with the hub, followed by a profile description of the person on them.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::{info, warn};

use crate::domain::error::{AppError, Result};
use crate::domain::hub::SubmitTarget;
use crate::domain::llm_config::{LLMConfig, VISION_MODEL};
use crate::domain::records::{ImageFile, ImagesData, ResultObj};
use crate::infrastructure::hub::{to_data_url, FetchedBytes, HubClient};
use crate::infrastructure::llm_clients::SharedLLMClient;
use crate::infrastructure::response::{completion_record, require_completion};
use crate::infrastructure::storage::ensure_dir;

pub const MAX_REPAIR_ROUNDS: usize = 10;

const URLS_PROMPT: &str = r#"In user's message, you will find a text in Polish language, that informs about image files and base url, where these files are stored. Your only job is is to return JSON with fields:
<fields>
- baseUrl - A base url for files
- files - an array of  objects with keys: "name" (image file name) and "fullPath" (full path to image - baseUrl + image path)
</fields>

<response_example>
{
  "baseUrl": "https://xxx.com/",
  "files": [
    { "name": "filename.png", "fullPath": "https://xxx.com/filename.png" }
  ]
}
</response_example>
"#;

const TOOL_SELECTION_PROMPT: &str = r#"User's message will be an image. Your job is to analyse this image and determie if it needs correction. Your answer should be a name of the tool, that should be used to correct the image. Tools are listed below.
<tools>
  - BRIGHTEN - this tool brightens the image. Use it, if the image is too dark and making it brighter would make it more readable.
  - DARKEN - this tool darkens the image. Use it, if the image is too bright and making it darker would make it more readable.
  - REPAIR - this tool can repair the image, if it has flaws, like blurs, glitches, noises. Use it if you see, that image is unreadable due tue reasons like that.
  - NONE - this means, that there is nothing wrong about the image and no tool should be used.
</tools>

<rules>
  - Always analyse images in context of it's readability
  - Always return a single word response
  - The response should always be one of the tools, or NONE if the tool should not be used
  - ALWAYS Respond with allowed tool name and nothing more
</rules>
"#;

const REPAIRED_IMAGE_PROMPT: &str = "User's message will include information about an image file. It may contain the file name itself, or a link to a file. Your job is to extract just the filename and return it. If it is a link, extract just the last segment, which is a filename and return it. Respond with just filename and nothing more.";

const PROFILE_PROMPT: &str = r#"User message will be a set of photos. Your job is to generate a profile description of a woman named "Barbara", based on these photos. We don't know how the woman looks, so you need to look for as much related information on photos as possible, then generate a very detailed profile description.
<rules>
  - Analyse set of photos with intention of gathering as much information about a woman named "Barbara"
  - Not all images have to be relevant - if the image does not provide useful information, skip it
  - Output your thinking and reasoning about the images, before generating a profile description. Be specific, look for even smallest details in her appearance.
  - Profile description should be as detailed as possible, considering all possible information from relevant images.
  - Focus on all characteristic and specific appearance points. If you find them, describe them in great detail. Describe how they look, what they present, where are they placed.
  - Describe every possible detail about her face, hair, head, eyes, nose, chicks, posture, such as EXACT colors, shapes, etc.
  - Profile description must be in Polish language
  - Your final respones should be a JSON with field "result", that will be your generated profile description
</rules>

<final_response_format>
{
  "result": "generated profile description"
}
</final_response_format>
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairTool {
    Brighten,
    Darken,
    Repair,
    None,
}

impl RepairTool {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairTool::Brighten => "BRIGHTEN",
            RepairTool::Darken => "DARKEN",
            RepairTool::Repair => "REPAIR",
            RepairTool::None => "NONE",
        }
    }
}

impl FromStr for RepairTool {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let word = s.trim().trim_matches(|c: char| !c.is_ascii_alphabetic());
        match word.to_ascii_uppercase().as_str() {
            "BRIGHTEN" => Ok(RepairTool::Brighten),
            "DARKEN" => Ok(RepairTool::Darken),
            "REPAIR" => Ok(RepairTool::Repair),
            "NONE" => Ok(RepairTool::None),
            _ => Err(AppError::ValidationError(format!("Unknown repair tool: {}", s))),
        }
    }
}

/// The hub side of the photo dialog.
#[async_trait]
pub trait PhotoDesk {
    /// Sends a command such as `START` or `REPAIR IMG_1.PNG` and returns the reply text.
    async fn send(&self, command: &str) -> Result<String>;
    async fn download(&self, url: &str) -> Result<FetchedBytes>;
}

#[async_trait]
impl PhotoDesk for HubClient {
    async fn send(&self, command: &str) -> Result<String> {
        Ok(self
            .submit("photos", command, SubmitTarget::Central)
            .await?
            .message)
    }

    async fn download(&self, url: &str) -> Result<FetchedBytes> {
        self.fetch_bytes(url).await
    }
}

/// Last path segment of a photo name, so it can only land inside the target dir.
pub fn photo_file_name(name: &str) -> Result<String> {
    Path::new(name.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .ok_or_else(|| AppError::ValidationError(format!("Invalid photo file name: {}", name)))
}

enum RepairStep {
    Confirmed(ImageFile),
    Pending(ImageFile),
}

pub struct PhotosUseCase {
    desk: Arc<dyn PhotoDesk + Send + Sync>,
    llm_client: SharedLLMClient,
    config: LLMConfig,
    photos_dir: PathBuf,
    repaired_dir: PathBuf,
}

impl PhotosUseCase {
    pub fn new(
        desk: Arc<dyn PhotoDesk + Send + Sync>,
        llm_client: SharedLLMClient,
        config: LLMConfig,
        photos_dir: PathBuf,
        repaired_dir: PathBuf,
    ) -> Self {
        Self {
            desk,
            llm_client,
            config,
            photos_dir,
            repaired_dir,
        }
    }

    /// Downloads `file` into `dir` unless it is already there, returning it as a data URL.
    async fn fetch_photo(&self, file: &ImageFile, dir: &Path) -> Result<String> {
        let fetched = self.desk.download(&file.full_path).await?;
        let target = dir.join(photo_file_name(&file.name)?);
        if !target.exists() {
            tokio::fs::write(&target, &fetched.bytes).await?;
        }
        let content_type = fetched.content_type.as_deref().unwrap_or("image/png");
        Ok(to_data_url(content_type, &fetched.bytes))
    }

    pub async fn select_tool(&self, file: &ImageFile) -> Result<RepairTool> {
        let image = self.fetch_photo(file, &self.photos_dir).await?;
        let completion = self
            .llm_client
            .generate_with_images(
                &self.config.with_model(VISION_MODEL),
                TOOL_SELECTION_PROMPT,
                None,
                &[image],
            )
            .await?;
        let completion = require_completion(completion, "Tool completion")?;
        info!(photo = %file.name, tool = %completion.trim(), "Tool selected");
        completion.parse()
    }

    async fn repair_step(&self, file: ImageFile, base_url: &str) -> Result<RepairStep> {
        let tool = self.select_tool(&file).await?;
        if tool == RepairTool::None {
            return Ok(RepairStep::Confirmed(file));
        }

        let message = self
            .desk
            .send(&format!("{} {}", tool.as_str(), file.name))
            .await?;
        info!(photo = %file.name, message = %message, "Repair reply");

        let completion = self
            .llm_client
            .generate(&self.config, REPAIRED_IMAGE_PROMPT, &message)
            .await?;
        let name = photo_file_name(&require_completion(completion, "Repaired image completion")?)?;
        Ok(RepairStep::Pending(ImageFile {
            full_path: format!("{}{}", base_url, name),
            name,
        }))
    }

    /// Repairs photos until the model accepts every one of them as is.
    pub async fn repair_all(&self, images: ImagesData) -> Result<Vec<ImageFile>> {
        ensure_dir(&self.photos_dir).await?;

        let mut confirmed = Vec::new();
        let mut pending = images.files;

        for round in 1..=MAX_REPAIR_ROUNDS {
            let steps = try_join_all(
                pending
                    .into_iter()
                    .map(|file| self.repair_step(file, &images.base_url)),
            )
            .await?;

            pending = Vec::new();
            for step in steps {
                match step {
                    RepairStep::Confirmed(file) => confirmed.push(file),
                    RepairStep::Pending(file) => pending.push(file),
                }
            }
            info!(round, confirmed = confirmed.len(), pending = pending.len(), "Repair round");

            if pending.is_empty() {
                return Ok(confirmed);
            }
        }

        warn!(pending = ?pending, "Photos still not confirmed");
        Err(AppError::Internal(format!(
            "Photos not confirmed after {} rounds",
            MAX_REPAIR_ROUNDS
        )))
    }

    pub async fn describe(&self, photos: &[ImageFile]) -> Result<String> {
        ensure_dir(&self.repaired_dir).await?;
        let images = try_join_all(
            photos
                .iter()
                .map(|photo| self.fetch_photo(photo, &self.repaired_dir)),
        )
        .await?;

        let completion = self
            .llm_client
            .generate_with_images(&self.config, PROFILE_PROMPT, None, &images)
            .await?;
        let completion = require_completion(completion, "Profile completion")?;
        let profile: ResultObj = completion_record(&completion)?;
        profile.result.ok_or_else(|| {
            AppError::NotFound("Profile description could not be extracted.".to_string())
        })
    }

    pub async fn execute(&self) -> Result<()> {
        let start = self.desk.send("START").await?;
        info!(message = %start, "Start");

        let completion = self
            .llm_client
            .generate(&self.config, URLS_PROMPT, &start)
            .await?;
        let completion = require_completion(completion, "URLs completion")?;
        let images: ImagesData = completion_record(&completion)?;
        info!(base_url = %images.base_url, files = images.files.len(), "Images data");

        let repaired = self.repair_all(images).await?;
        let profile = self.describe(&repaired).await?;
        info!(profile = %profile, "Profile description");

        self.desk.send(&profile).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_photo_file_name_keeps_last_segment() {
        assert_eq!(photo_file_name(" IMG_559_FGR4.PNG\n").unwrap(), "IMG_559_FGR4.PNG");
        assert_eq!(photo_file_name("../../etc/IMG_1.PNG").unwrap(), "IMG_1.PNG");
        assert_eq!(photo_file_name("dir/sub/IMG_2.PNG").unwrap(), "IMG_2.PNG");
        assert!(matches!(photo_file_name(".."), Err(AppError::ValidationError(_))));
        assert!(photo_file_name("").is_err());
    }
    use crate::infrastructure::llm_clients::testing::ScriptedClient;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeDesk {
        commands: Mutex<Vec<String>>,
        downloads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PhotoDesk for FakeDesk {
        async fn send(&self, command: &str) -> Result<String> {
            self.commands.lock().unwrap().push(command.to_string());
            Ok(format!("Proszę: https://hub.example/barbara/{}", "IMG_1_FXER.PNG"))
        }

        async fn download(&self, url: &str) -> Result<FetchedBytes> {
            self.downloads.lock().unwrap().push(url.to_string());
            Ok(FetchedBytes {
                bytes: b"png".to_vec(),
                content_type: Some("image/png".to_string()),
            })
        }
    }

    fn use_case(desk: Arc<FakeDesk>, llm: Arc<ScriptedClient>) -> PhotosUseCase {
        let root = std::env::temp_dir().join(format!("photos-{}", uuid::Uuid::new_v4()));
        PhotosUseCase::new(
            desk,
            llm,
            LLMConfig::default(),
            root.join("barbara-photos"),
            root.join("barbara-photos-repaired"),
        )
    }

    fn images(names: &[&str]) -> ImagesData {
        ImagesData {
            base_url: "https://hub.example/barbara/".to_string(),
            files: names
                .iter()
                .map(|name| ImageFile {
                    name: name.to_string(),
                    full_path: format!("https://hub.example/barbara/{}", name),
                })
                .collect(),
        }
    }

    #[test]
    fn test_repair_tool_parsing() {
        assert_eq!("REPAIR".parse::<RepairTool>().unwrap(), RepairTool::Repair);
        assert_eq!(" darken.\n".parse::<RepairTool>().unwrap(), RepairTool::Darken);
        assert_eq!("NONE".parse::<RepairTool>().unwrap(), RepairTool::None);
        assert!("SHARPEN".parse::<RepairTool>().is_err());
    }

    #[tokio::test]
    async fn test_repair_loop_until_confirmed() {
        let desk = Arc::new(FakeDesk::default());
        let llm = Arc::new(ScriptedClient::new([
            "REPAIR",
            "IMG_1_FXER.PNG",
            "NONE",
        ]));
        let photos = use_case(desk.clone(), llm.clone());

        let repaired = photos.repair_all(images(&["IMG_1.PNG"])).await.unwrap();

        assert_eq!(
            repaired,
            vec![ImageFile {
                name: "IMG_1_FXER.PNG".to_string(),
                full_path: "https://hub.example/barbara/IMG_1_FXER.PNG".to_string(),
            }]
        );
        assert_eq!(*desk.commands.lock().unwrap(), vec!["REPAIR IMG_1.PNG"]);
        let calls = llm.calls();
        assert_eq!(calls[0].model, VISION_MODEL);
        assert_eq!(calls[0].images, 1);
        assert!(photos.photos_dir.join("IMG_1.PNG").exists());
        assert!(photos.photos_dir.join("IMG_1_FXER.PNG").exists());
    }

    #[tokio::test]
    async fn test_repair_rounds_are_bounded() {
        let desk = Arc::new(FakeDesk::default());
        let replies: Vec<&str> = std::iter::repeat(["BRIGHTEN", "IMG_1_FXER.PNG"])
            .take(MAX_REPAIR_ROUNDS)
            .flatten()
            .collect();
        let photos = use_case(desk.clone(), Arc::new(ScriptedClient::new(replies)));

        let result = photos.repair_all(images(&["IMG_1.PNG"])).await;

        assert!(matches!(result, Err(AppError::Internal(_))));
        assert_eq!(desk.commands.lock().unwrap().len(), MAX_REPAIR_ROUNDS);
    }

    #[tokio::test]
    async fn test_profile_from_repaired_photos() {
        let desk = Arc::new(FakeDesk::default());
        let llm = Arc::new(ScriptedClient::new([
            "Analiza...\n{ \"result\": \"Barbara ma krótkie czarne włosy\" }",
        ]));
        let photos = use_case(desk, llm.clone());

        let profile = photos
            .describe(&images(&["IMG_1_FXER.PNG", "IMG_2.PNG"]).files)
            .await
            .unwrap();

        assert_eq!(profile, "Barbara ma krótkie czarne włosy");
        assert_eq!(llm.calls()[0].images, 2);
        assert!(photos.repaired_dir.join("IMG_2.PNG").exists());
    }
}
