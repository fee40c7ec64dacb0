pub mod routes {
    pub const HEALTH: &str = "/health";
    pub const PROCESS: &str = "/process";
}

/// Wire names of the `POST /process` body.
pub mod fields {
    pub const SHOULD_BUILD: &str = "shouldBuild";
    pub const IMAGE_NAME: &str = "imageName";
    pub const JOB_ID: &str = "photogrammetryId";
}

pub mod env {
    pub const DEPLOYMENT_MODE: &str = "DEPLOYMENT_MODE";
    pub const MAIN_SERVER_URL: &str = "MAIN_SERVER_URL";

    pub const AWS_REGION: &str = "AWS_REGION";
    pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
    pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
    pub const S3_BUCKET_NAME: &str = "S3_BUCKET_NAME";

    /// Secrets forwarded verbatim into every launched container.
    pub const REQUIRED: [&str; 4] = [
        AWS_REGION,
        AWS_ACCESS_KEY_ID,
        AWS_SECRET_ACCESS_KEY,
        S3_BUCKET_NAME,
    ];

    /// Value some deployment scripts write for an unset variable.
    pub const PLACEHOLDER: &str = "undefined";
}

pub mod defaults {
    pub const CPU_TAG: &str = "photogrammetry-cpu";
    pub const GPU_TAG: &str = "photogrammetry-gpu";
    pub const BUILD_CONTEXT: &str = "./photogrammetry";
    pub const BUILD_FILE: &str = "Dockerfile";
    pub const CONTAINER_INPUT: &str = "/app/input";
    pub const CONTAINER_OUTPUT: &str = "/app/output";
}
