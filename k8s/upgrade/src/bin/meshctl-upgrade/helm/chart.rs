use crate::common::{
    constants::CRDS_DIR_PREFIX,
    error::{
        ChartFileOutsideChart, NotAFile, ReadingDirectoryContents, ReadingFile, Result,
        U8VectorToString, YamlParseFromFile, YamlParseFromSlice,
    },
};
use semver::Version;
use serde::Deserialize;
use serde_yaml::Value;
use snafu::{OptionExt, ResultExt};
use std::{
    fs,
    path::{Path, PathBuf},
    str,
};

/// This is the name of the chart metadata file, relative to the chart root.
const CHART_YAML: &str = "Chart.yaml";

/// This is the name of the default values file, relative to the chart root.
const VALUES_YAML: &str = "values.yaml";

/// This struct is used to deserialize helm charts' Chart.yaml file.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Chart {
    /// This is the name of the helm chart.
    name: String,
    /// This is the version of the helm chart.
    version: Version,
    /// This is the version of the application packaged by the chart.
    #[serde(default)]
    app_version: Option<String>,
}

impl Chart {
    /// This is a getter for the helm chart name.
    pub(crate) fn name(&self) -> &str {
        self.name.as_str()
    }

    /// This is a getter for the helm chart version.
    pub(crate) fn version(&self) -> &Version {
        &self.version
    }

    /// This is the image version the chart deploys by default. Falls back to the chart version
    /// when appVersion is not set.
    pub(crate) fn default_image_tag(&self) -> String {
        self.app_version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(ToString::to_string)
            .unwrap_or_else(|| self.version.to_string())
    }
}

impl TryFrom<&Path> for Chart {
    type Error = crate::common::error::Error;

    fn try_from(path: &Path) -> Result<Self, Self::Error> {
        let buf = fs::read(path).context(ReadingFile {
            filepath: path.to_path_buf(),
        })?;

        serde_yaml::from_slice(buf.as_slice()).context(YamlParseFromFile {
            filepath: path.to_path_buf(),
        })
    }
}

/// A file from a helm chart, held in memory.
#[derive(Clone, Debug)]
pub(crate) struct ChartFile {
    /// The '/'-separated path of the file, relative to the chart root, e.g. 'crds/foo.yaml'.
    name: String,
    data: Vec<u8>,
}

impl ChartFile {
    pub(crate) fn new<N>(name: N, data: Vec<u8>) -> Self
    where
        N: ToString,
    {
        Self {
            name: name.to_string(),
            data,
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.name.as_str()
    }

    pub(crate) fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Files inside the chart's crds directory carry CustomResourceDefinitions.
    pub(crate) fn is_crd(&self) -> bool {
        self.name.starts_with(CRDS_DIR_PREFIX)
    }
}

/// All of the files of a helm chart directory, along with its parsed Chart.yaml.
pub(crate) struct ChartFiles {
    dir: PathBuf,
    chart: Chart,
    files: Vec<ChartFile>,
}

impl ChartFiles {
    /// Reads every regular file under the chart directory. The files are sorted by name.
    pub(crate) fn load<P>(dir: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let dir = dir.as_ref().to_path_buf();

        let mut paths: Vec<PathBuf> = Vec::new();
        collect_file_paths(dir.as_path(), &mut paths)?;

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let name = relative_name(dir.as_path(), path.as_path())?;
            let data = fs::read(path.as_path()).context(ReadingFile { filepath: path })?;
            files.push(ChartFile::new(name, data));
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));

        let chart = Chart::try_from(dir.join(CHART_YAML).as_path())?;

        Ok(Self { dir, chart, files })
    }

    /// The chart directory the files were loaded from.
    pub(crate) fn dir(&self) -> &Path {
        self.dir.as_path()
    }

    /// The parsed Chart.yaml of the chart.
    pub(crate) fn chart(&self) -> &Chart {
        &self.chart
    }

    /// Look up a file by its chart-relative name.
    pub(crate) fn file(&self, name: &str) -> Option<&ChartFile> {
        self.files.iter().find(|file| file.name.eq(name))
    }

    /// The CustomResourceDefinition manifests bundled with the chart.
    pub(crate) fn crds(&self) -> impl Iterator<Item = &ChartFile> {
        self.files.iter().filter(|file| file.is_crd())
    }

    /// The default helm values of the chart, from its values.yaml file.
    pub(crate) fn default_values(&self) -> Result<Value> {
        let values_file = self.file(VALUES_YAML).context(NotAFile {
            path: self.dir.join(VALUES_YAML),
        })?;

        serde_yaml::from_slice(values_file.data()).context(YamlParseFromSlice {
            input_yaml: str::from_utf8(values_file.data())
                .context(U8VectorToString)?
                .to_string(),
        })
    }
}

/// Walks the directory tree and collects the paths of regular files.
fn collect_file_paths(dir: &Path, paths: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).context(ReadingDirectoryContents {
        path: dir.to_path_buf(),
    })?;

    for entry in entries {
        let path = entry
            .context(ReadingDirectoryContents {
                path: dir.to_path_buf(),
            })?
            .path();

        if path.is_dir() {
            collect_file_paths(path.as_path(), paths)?;
        } else if path.is_file() {
            paths.push(path);
        }
    }

    Ok(())
}

/// Chart file names use '/' as the separator, irrespective of the platform.
fn relative_name(chart_dir: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(chart_dir).map_err(|_| {
        ChartFileOutsideChart {
            filepath: path.to_path_buf(),
            chart_dir: chart_dir.to_path_buf(),
        }
        .build()
    })?;

    Ok(relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<String>>()
        .join("/"))
}
